//! Raw webhook events and their normalized canonical form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

/// Processing status of a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EventStatus {
    /// Stored but not yet normalized.
    Pending,
    /// Successfully normalized.
    Parsed,
    /// Normalization failed; the payload is kept for inspection.
    Failed,
}

/// A raw inbound webhook event. The payload is stored opaquely; processing
/// status is the only field that mutates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    #[sqlx(rename = "event_id")]
    pub id: i64,
    /// Owning user, resolved from the payload's alert id at ingestion time.
    pub user_id: i64,
    /// Source identifier, e.g. `easyconnect:<alert_id>`.
    pub source: String,
    /// The raw payload, verbatim.
    pub payload: Json<serde_json::Value>,
    /// The `X-Signature` header value the event arrived with, if any.
    pub signature: Option<String>,
    pub status: EventStatus,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Insert form of [`Event`].
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: i64,
    pub source: String,
    pub payload: serde_json::Value,
    pub signature: Option<String>,
}

/// Canonical representation of a raw event, the single input to all
/// detection logic. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NormalizedEvent {
    #[sqlx(rename = "normalized_event_id")]
    pub id: i64,
    pub event_id: Option<i64>,
    pub chain: String,
    pub contract_address: Option<String>,
    /// Human-readable contract label, e.g. `QX`.
    pub contract_label: Option<String>,
    pub event_name: String,
    pub tx_hash: Option<String>,
    pub tx_status: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    /// Amount in the token's smallest unit.
    pub amount: Option<i64>,
    pub token_symbol: String,
    pub block_height: Option<i64>,
    /// Qubic-specific block counter.
    pub tick: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Insert form of [`NormalizedEvent`], produced by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNormalizedEvent {
    pub event_id: Option<i64>,
    pub chain: String,
    pub contract_address: Option<String>,
    pub contract_label: Option<String>,
    pub event_name: String,
    pub tx_hash: Option<String>,
    pub tx_status: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub amount: Option<i64>,
    pub token_symbol: String,
    pub block_height: Option<i64>,
    pub tick: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}
