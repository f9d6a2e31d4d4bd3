//! Incidents: the actionable artifacts produced by rule matches and
//! detections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use super::{Scope, Severity};

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

/// A detected noteworthy occurrence. Created by the rule engine or the
/// classification engine; mutated only through status/notes/assignment
/// updates and never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Incident {
    #[sqlx(rename = "incident_id")]
    pub id: i64,
    pub user_id: i64,
    pub severity: Severity,
    pub status: IncidentStatus,
    /// Incident type/category, e.g. `WhaleTransfer` or a detection category.
    pub kind: String,
    pub scope: Option<Scope>,
    pub title: String,
    pub description: Option<String>,
    pub protocol: Option<String>,
    pub contract_address: Option<String>,
    pub primary_wallet: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Triggering rule, when created by the rule engine.
    pub rule_id: Option<i64>,
    /// Triggering detection, when created by the classification path.
    pub detection_id: Option<i64>,
    pub deduplication_key: Option<String>,
    pub tags: Json<Vec<String>>,
    pub metadata: Json<serde_json::Value>,
    pub user_notes: Option<String>,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert form of [`Incident`].
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub user_id: i64,
    pub severity: Severity,
    pub kind: String,
    pub scope: Option<Scope>,
    pub title: String,
    pub description: Option<String>,
    pub protocol: Option<String>,
    pub contract_address: Option<String>,
    pub primary_wallet: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub rule_id: Option<i64>,
    pub detection_id: Option<i64>,
    pub deduplication_key: Option<String>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
}

/// List filter for incidents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentFilter {
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub status: Option<IncidentStatus>,
}

/// Mutable fields of an incident. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentUpdate {
    #[serde(default)]
    pub status: Option<IncidentStatus>,
    #[serde(default)]
    pub user_notes: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
}
