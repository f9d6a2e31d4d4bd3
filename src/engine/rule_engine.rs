//! Evaluates normalized events against user-defined rules and creates
//! incidents.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use crate::{
    models::{Incident, NewIncident, NormalizedEvent, Rule, User},
    persistence::{error::PersistenceError, traits::AppRepository},
};

/// Evaluates each normalized event against every enabled rule the owning
/// user has, creating deduplicated incidents for the rules that match.
pub struct RuleEngine<R: AppRepository> {
    repository: Arc<R>,
    evaluation_enabled: bool,
    deduplication_enabled: bool,
}

impl<R: AppRepository> RuleEngine<R> {
    pub fn new(repository: Arc<R>, evaluation_enabled: bool, deduplication_enabled: bool) -> Self {
        Self { repository, evaluation_enabled, deduplication_enabled }
    }

    /// Evaluates an event against all of the user's enabled rules. Failures
    /// in a single rule are logged and skipped so one bad rule cannot block
    /// the rest.
    pub async fn evaluate_event(
        &self,
        user: &User,
        event: &NormalizedEvent,
    ) -> Result<Vec<Incident>, PersistenceError> {
        if !self.evaluation_enabled {
            return Ok(Vec::new());
        }

        let rules = self.repository.get_enabled_rules(user.id).await?;

        let mut incidents = Vec::new();
        for rule in &rules {
            match self.evaluate_rule(event, rule).await {
                Ok(true) => match self.create_incident(event, rule).await {
                    Ok(Some(incident)) => incidents.push(incident),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(
                            rule_id = rule.id,
                            rule_name = %rule.name,
                            error = %e,
                            "Failed to create incident for matched rule."
                        );
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        rule_id = rule.id,
                        rule_name = %rule.name,
                        error = %e,
                        "Rule evaluation failed."
                    );
                }
            }
        }

        Ok(incidents)
    }

    /// Whether the event satisfies every predicate of the rule, including
    /// the aggregation-window count when configured.
    async fn evaluate_rule(
        &self,
        event: &NormalizedEvent,
        rule: &Rule,
    ) -> Result<bool, PersistenceError> {
        // Conjunction of predicates; an empty conditions object matches
        // every event.
        if !rule.conditions.predicates().iter().all(|p| p.matches(event)) {
            return Ok(false);
        }

        if let Some(window_seconds) = rule.aggregation_window_seconds {
            if !self.check_aggregation_window(event, rule, window_seconds).await? {
                return Ok(false);
            }
        }

        tracing::info!(
            rule_name = %rule.name,
            event_id = event.id,
            event_name = %event.event_name,
            "Rule matched."
        );
        Ok(true)
    }

    /// Counts similar events in `[timestamp - window, timestamp]` and
    /// compares against the rule's minimum count.
    async fn check_aggregation_window(
        &self,
        event: &NormalizedEvent,
        rule: &Rule,
        window_seconds: i64,
    ) -> Result<bool, PersistenceError> {
        let window_start = event.timestamp - Duration::seconds(window_seconds);
        let count = self
            .repository
            .count_similar_events(
                &event.event_name,
                event.contract_address.as_deref(),
                window_start,
                event.timestamp,
            )
            .await?;
        Ok(count >= rule.aggregation_min_count)
    }

    /// Creates the incident for a matched rule, unless a matching
    /// deduplication key was seen within the cooldown window.
    async fn create_incident(
        &self,
        event: &NormalizedEvent,
        rule: &Rule,
    ) -> Result<Option<Incident>, PersistenceError> {
        let dedup_key = if self.deduplication_enabled {
            rule.deduplication_key_template.as_deref().map(|template| {
                // Keys are scoped per rule so two rules with the same
                // template never suppress each other.
                format!("{}:{}", rule.id, render_dedup_key(template, event))
            })
        } else {
            None
        };

        if let Some(key) = &dedup_key {
            let cutoff = Utc::now() - Duration::seconds(rule.cooldown_seconds);
            if self.repository.dedup_key_seen_since(key, cutoff).await? {
                tracing::info!(dedup_key = %key, "Incident deduplicated.");
                return Ok(None);
            }
        }

        let (title, description) = build_incident_content(event, rule);

        let incident = self
            .repository
            .insert_incident(&NewIncident {
                user_id: rule.user_id,
                severity: rule.severity,
                kind: rule.kind.clone().unwrap_or_else(|| "Unknown".to_string()),
                scope: rule.scope,
                title,
                description: Some(description),
                protocol: event.contract_label.clone(),
                contract_address: event.contract_address.clone(),
                primary_wallet: event.from_address.clone(),
                first_seen_at: event.timestamp,
                last_seen_at: event.timestamp,
                rule_id: Some(rule.id),
                detection_id: None,
                deduplication_key: dedup_key,
                tags: Vec::new(),
                metadata: json!({
                    "amount": event.amount,
                    "token": event.token_symbol,
                    "tx_hash": event.tx_hash,
                    "event_name": event.event_name,
                }),
            })
            .await?;

        self.repository.link_incident_event(incident.id, event.id).await?;

        tracing::info!(
            incident_id = incident.id,
            severity = %incident.severity,
            kind = %incident.kind,
            rule_name = %rule.name,
            "Incident created."
        );

        Ok(Some(incident))
    }
}

/// Renders a deduplication key template against an event. Missing addresses
/// render as `unknown`; `{date}` and `{hour}` use the event timestamp.
pub fn render_dedup_key(template: &str, event: &NormalizedEvent) -> String {
    template
        .replace("{from_address}", event.from_address.as_deref().unwrap_or("unknown"))
        .replace("{to_address}", event.to_address.as_deref().unwrap_or("unknown"))
        .replace("{contract_address}", event.contract_address.as_deref().unwrap_or("unknown"))
        .replace("{date}", &event.timestamp.format("%Y-%m-%d").to_string())
        .replace("{hour}", &event.timestamp.format("%Y-%m-%d-%H").to_string())
}

/// Builds the incident title and description with type-specific formatting.
pub fn build_incident_content(event: &NormalizedEvent, rule: &Rule) -> (String, String) {
    match rule.kind.as_deref() {
        Some("WhaleTransfer") => {
            let amount = format_amount(event.amount.unwrap_or(0));
            let title = format!("Whale Transfer: {} {}", amount, event.token_symbol);
            let description = format!(
                "Large transfer detected on {}.\n\n\
                 Amount: {} {}\n\
                 From: {}\n\
                 To: {}\n\
                 Transaction: {}",
                event.contract_label.as_deref().unwrap_or("Qubic network"),
                amount,
                event.token_symbol,
                event.from_address.as_deref().unwrap_or("unknown"),
                event.to_address.as_deref().unwrap_or("unknown"),
                event.tx_hash.as_deref().unwrap_or("unknown"),
            );
            (title, description)
        }
        Some("FailureSpike") => {
            let title = format!(
                "Transaction Failure Spike on {}",
                event.contract_label.as_deref().unwrap_or("Network")
            );
            let description = format!(
                "Elevated transaction failure rate detected.\n\n\
                 Contract: {}\n\
                 Event: {}\n\
                 Status: {}",
                event.contract_address.as_deref().unwrap_or("unknown"),
                event.event_name,
                event.tx_status,
            );
            (title, description)
        }
        _ => {
            let title = rule.name.clone();
            let description = rule.description.clone().unwrap_or_else(|| {
                format!("Rule '{}' triggered by event {}", rule.name, event.event_name)
            });
            (title, description)
        }
    }
}

/// Formats an amount with thousands separators, e.g. `5,000,000`.
fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0 { format!("-{}", grouped) } else { grouped }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mockall::predicate::eq;
    use sqlx::types::Json;

    use super::*;
    use crate::{
        models::{IncidentStatus, RuleConditions, Severity},
        persistence::traits::MockAppRepository,
    };

    fn test_user() -> User {
        User {
            id: 1,
            alert_id: "alert-1".to_string(),
            email: None,
            email_verified: false,
            discord_webhook_url: None,
            discord_verified: false,
            telegram_chat_id: None,
            telegram_verified: false,
            quiet_hours_enabled: false,
            quiet_hours_start: None,
            quiet_hours_end: None,
            quiet_hours_timezone: "UTC".to_string(),
            quiet_hours_override_high: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_event(amount: Option<i64>) -> NormalizedEvent {
        NormalizedEvent {
            id: 7,
            event_id: Some(3),
            chain: "QUBIC".to_string(),
            contract_address: Some("QX_CONTRACT".to_string()),
            contract_label: Some("QX".to_string()),
            event_name: "Transfer".to_string(),
            tx_hash: Some("deadbeef".to_string()),
            tx_status: "success".to_string(),
            from_address: Some("SENDER".to_string()),
            to_address: Some("RECIPIENT".to_string()),
            amount,
            token_symbol: "QUBIC".to_string(),
            block_height: None,
            tick: Some(100),
            timestamp: Utc.with_ymd_and_hms(2026, 8, 1, 14, 30, 0).unwrap(),
            metadata: Json(json!({})),
            created_at: Utc::now(),
        }
    }

    fn whale_rule(template: Option<&str>) -> Rule {
        Rule {
            id: 42,
            user_id: 1,
            name: "whale-watch".to_string(),
            description: None,
            severity: Severity::Critical,
            kind: Some("WhaleTransfer".to_string()),
            scope: None,
            conditions: Json(RuleConditions {
                event_name: Some("Transfer".to_string()),
                amount_greater_than: Some(1_000_000),
                ..Default::default()
            }),
            aggregation_window_seconds: None,
            aggregation_min_count: 1,
            deduplication_key_template: template.map(str::to_string),
            cooldown_seconds: 300,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn incident_from(new: &NewIncident) -> Incident {
        Incident {
            id: 99,
            user_id: new.user_id,
            severity: new.severity,
            status: IncidentStatus::Open,
            kind: new.kind.clone(),
            scope: new.scope,
            title: new.title.clone(),
            description: new.description.clone(),
            protocol: new.protocol.clone(),
            contract_address: new.contract_address.clone(),
            primary_wallet: new.primary_wallet.clone(),
            first_seen_at: new.first_seen_at,
            last_seen_at: new.last_seen_at,
            rule_id: new.rule_id,
            detection_id: new.detection_id,
            deduplication_key: new.deduplication_key.clone(),
            tags: Json(new.tags.clone()),
            metadata: Json(new.metadata.clone()),
            user_notes: None,
            assigned_to: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_dedup_key_placeholders() {
        let event = test_event(Some(5_000_000));
        let key = render_dedup_key("{from_address}:{to_address}:{date}:{hour}", &event);
        assert_eq!(key, "SENDER:RECIPIENT:2026-08-01:2026-08-01-14");
    }

    #[test]
    fn test_render_dedup_key_missing_addresses() {
        let mut event = test_event(None);
        event.from_address = None;
        event.contract_address = None;
        let key = render_dedup_key("{from_address}|{contract_address}", &event);
        assert_eq!(key, "unknown|unknown");
    }

    #[test]
    fn test_whale_transfer_content() {
        let event = test_event(Some(5_000_000));
        let rule = whale_rule(None);
        let (title, description) = build_incident_content(&event, &rule);
        assert_eq!(title, "Whale Transfer: 5,000,000 QUBIC");
        assert!(description.contains("Large transfer detected on QX."));
        assert!(description.contains("From: SENDER"));
    }

    #[test]
    fn test_generic_rule_content_falls_back_to_rule_name() {
        let event = test_event(Some(10));
        let mut rule = whale_rule(None);
        rule.kind = None;
        let (title, description) = build_incident_content(&event, &rule);
        assert_eq!(title, "whale-watch");
        assert!(description.contains("triggered by event Transfer"));
    }

    #[test]
    fn test_format_amount_groups_digits() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(999), "999");
        assert_eq!(format_amount(1_000), "1,000");
        assert_eq!(format_amount(1_234_567_890), "1,234,567,890");
        assert_eq!(format_amount(-25_000), "-25,000");
    }

    #[tokio::test]
    async fn test_matching_event_creates_incident() {
        let mut mock = MockAppRepository::new();
        mock.expect_get_enabled_rules()
            .with(eq(1i64))
            .returning(|_| Ok(vec![whale_rule(Some("{from_address}:{date}"))]));
        mock.expect_dedup_key_seen_since().returning(|_, _| Ok(false));
        mock.expect_insert_incident().returning(|new| Ok(incident_from(new)));
        mock.expect_link_incident_event().with(eq(99i64), eq(7i64)).returning(|_, _| Ok(()));

        let engine = RuleEngine::new(Arc::new(mock), true, true);
        let incidents =
            engine.evaluate_event(&test_user(), &test_event(Some(5_000_000))).await.unwrap();

        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind, "WhaleTransfer");
        assert_eq!(
            incidents[0].deduplication_key.as_deref(),
            Some("42:SENDER:2026-08-01")
        );
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let mut mock = MockAppRepository::new();
        mock.expect_get_enabled_rules().returning(|_| Ok(vec![whale_rule(None)]));

        let engine = RuleEngine::new(Arc::new(mock), true, true);
        // Exactly the threshold must not match.
        let incidents =
            engine.evaluate_event(&test_user(), &test_event(Some(1_000_000))).await.unwrap();
        assert!(incidents.is_empty());
    }

    #[tokio::test]
    async fn test_incident_suppressed_within_cooldown() {
        let mut mock = MockAppRepository::new();
        mock.expect_get_enabled_rules()
            .returning(|_| Ok(vec![whale_rule(Some("{from_address}"))]));
        mock.expect_dedup_key_seen_since()
            .withf(|key, _| key == "42:SENDER")
            .returning(|_, _| Ok(true));
        mock.expect_insert_incident().never();

        let engine = RuleEngine::new(Arc::new(mock), true, true);
        let incidents =
            engine.evaluate_event(&test_user(), &test_event(Some(5_000_000))).await.unwrap();
        assert!(incidents.is_empty());
    }

    #[tokio::test]
    async fn test_aggregation_window_below_min_count() {
        let mut rule = whale_rule(None);
        rule.aggregation_window_seconds = Some(60);
        rule.aggregation_min_count = 5;

        let mut mock = MockAppRepository::new();
        mock.expect_get_enabled_rules().returning(move |_| Ok(vec![rule.clone()]));
        mock.expect_count_similar_events().returning(|_, _, _, _| Ok(3));
        mock.expect_insert_incident().never();

        let engine = RuleEngine::new(Arc::new(mock), true, true);
        let incidents =
            engine.evaluate_event(&test_user(), &test_event(Some(5_000_000))).await.unwrap();
        assert!(incidents.is_empty());
    }

    #[tokio::test]
    async fn test_evaluation_disabled_short_circuits() {
        let mut mock = MockAppRepository::new();
        mock.expect_get_enabled_rules().never();

        let engine = RuleEngine::new(Arc::new(mock), false, true);
        let incidents =
            engine.evaluate_event(&test_user(), &test_event(Some(5_000_000))).await.unwrap();
        assert!(incidents.is_empty());
    }

    #[tokio::test]
    async fn test_empty_conditions_match_everything() {
        let mut rule = whale_rule(Some("always:{date}"));
        rule.conditions = Json(RuleConditions::default());
        rule.kind = None;

        let mut mock = MockAppRepository::new();
        mock.expect_get_enabled_rules().returning(move |_| Ok(vec![rule.clone()]));
        mock.expect_dedup_key_seen_since().returning(|_, _| Ok(false));
        mock.expect_insert_incident().returning(|new| Ok(incident_from(new)));
        mock.expect_link_incident_event().returning(|_, _| Ok(()));

        let engine = RuleEngine::new(Arc::new(mock), true, true);
        let incidents = engine.evaluate_event(&test_user(), &test_event(None)).await.unwrap();
        assert_eq!(incidents.len(), 1);
    }
}
