//! User-defined detection rules and their condition predicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use super::{NormalizedEvent, Scope, Severity};

/// A user-owned declarative matcher evaluated against every normalized event.
///
/// Rules are soft-disabled via `enabled` rather than deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rule {
    #[sqlx(rename = "rule_id")]
    pub id: i64,
    pub user_id: i64,
    /// Unique per owner.
    pub name: String,
    pub description: Option<String>,
    pub severity: Severity,
    /// Incident type produced on match, e.g. `WhaleTransfer`, `FailureSpike`.
    pub kind: Option<String>,
    pub scope: Option<Scope>,
    pub conditions: Json<RuleConditions>,
    /// Aggregation look-back window; `None` disables the aggregation check.
    pub aggregation_window_seconds: Option<i64>,
    /// Minimum similar-event count within the window.
    pub aggregation_min_count: i64,
    /// Template with `{from_address}`, `{to_address}`, `{contract_address}`,
    /// `{date}` and `{hour}` placeholders. `None` disables deduplication.
    pub deduplication_key_template: Option<String>,
    pub cooldown_seconds: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Matching conditions, a conjunction of independent predicates. Absent
/// fields are vacuously true; the empty object matches every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConditions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_greater_than: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_less_than: Option<i64>,
}

/// A single rule predicate. Each present condition field maps to exactly one
/// predicate; the engine evaluates them uniformly as a conjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    EventNameEquals(String),
    FromAddressEquals(String),
    ToAddressEquals(String),
    ContractAddressEquals(String),
    ContractLabelEquals(String),
    TokenSymbolEquals(String),
    TxStatusEquals(String),
    /// Strict `>`.
    AmountGreaterThan(i64),
    /// Strict `<`.
    AmountLessThan(i64),
}

impl Predicate {
    /// Whether the event satisfies this predicate.
    pub fn matches(&self, event: &NormalizedEvent) -> bool {
        match self {
            Predicate::EventNameEquals(v) => event.event_name == *v,
            Predicate::FromAddressEquals(v) => event.from_address.as_deref() == Some(v),
            Predicate::ToAddressEquals(v) => event.to_address.as_deref() == Some(v),
            Predicate::ContractAddressEquals(v) => event.contract_address.as_deref() == Some(v),
            Predicate::ContractLabelEquals(v) => event.contract_label.as_deref() == Some(v),
            Predicate::TokenSymbolEquals(v) => event.token_symbol == *v,
            Predicate::TxStatusEquals(v) => event.tx_status == *v,
            Predicate::AmountGreaterThan(t) => event.amount.is_some_and(|a| a > *t),
            Predicate::AmountLessThan(t) => event.amount.is_some_and(|a| a < *t),
        }
    }
}

impl RuleConditions {
    /// Expands the conditions object into its list of predicates.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut preds = Vec::new();
        if let Some(v) = &self.event_name {
            preds.push(Predicate::EventNameEquals(v.clone()));
        }
        if let Some(v) = &self.from_address {
            preds.push(Predicate::FromAddressEquals(v.clone()));
        }
        if let Some(v) = &self.to_address {
            preds.push(Predicate::ToAddressEquals(v.clone()));
        }
        if let Some(v) = &self.contract_address {
            preds.push(Predicate::ContractAddressEquals(v.clone()));
        }
        if let Some(v) = &self.contract_label {
            preds.push(Predicate::ContractLabelEquals(v.clone()));
        }
        if let Some(v) = &self.token_symbol {
            preds.push(Predicate::TokenSymbolEquals(v.clone()));
        }
        if let Some(v) = &self.tx_status {
            preds.push(Predicate::TxStatusEquals(v.clone()));
        }
        if let Some(t) = self.amount_greater_than {
            preds.push(Predicate::AmountGreaterThan(t));
        }
        if let Some(t) = self.amount_less_than {
            preds.push(Predicate::AmountLessThan(t));
        }
        preds
    }
}

/// Payload for creating a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub conditions: RuleConditions,
    #[serde(default)]
    pub aggregation_window_seconds: Option<i64>,
    #[serde(default = "default_min_count")]
    pub aggregation_min_count: i64,
    #[serde(default)]
    pub deduplication_key_template: Option<String>,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Payload for updating a rule. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub conditions: Option<RuleConditions>,
    #[serde(default)]
    pub aggregation_window_seconds: Option<i64>,
    #[serde(default)]
    pub aggregation_min_count: Option<i64>,
    #[serde(default)]
    pub deduplication_key_template: Option<String>,
    #[serde(default)]
    pub cooldown_seconds: Option<i64>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn default_min_count() -> i64 {
    1
}

fn default_cooldown() -> i64 {
    300
}

fn default_enabled() -> bool {
    true
}
