//! Notification routing rules and the delivery audit trail.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{Scope, Severity};

/// A delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ChannelKind {
    Discord,
    Telegram,
    Email,
    Webhook,
}

impl ChannelKind {
    /// The canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Discord => "discord",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much detail a routed notification carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NotificationFormat {
    #[default]
    Minimal,
    Detailed,
}

/// Delivery status of a single notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// A user-owned matcher mapping a severity (and optionally type/scope) to a
/// set of delivery channels. All enabled matching rules execute.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoutingRule {
    #[sqlx(rename = "routing_rule_id")]
    pub id: i64,
    pub user_id: i64,
    pub severity: Severity,
    pub incident_type: Option<String>,
    pub scope: Option<Scope>,
    pub discord_webhook_url: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub email_enabled: bool,
    pub webhook_url: Option<String>,
    /// Shared secret used to sign payloads sent to `webhook_url`.
    pub webhook_secret: Option<String>,
    pub notification_format: NotificationFormat,
    pub priority: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a routing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoutingRule {
    pub severity: Severity,
    #[serde(default)]
    pub incident_type: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default)]
    pub email_enabled: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub notification_format: NotificationFormat,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// One row per delivery attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationLog {
    #[sqlx(rename = "notification_log_id")]
    pub id: i64,
    pub user_id: i64,
    pub incident_id: Option<i64>,
    pub detection_id: Option<i64>,
    pub routing_rule_id: Option<i64>,
    pub channel: ChannelKind,
    pub destination: String,
    pub severity: Option<Severity>,
    pub status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Insert form of [`NotificationLog`].
#[derive(Debug, Clone)]
pub struct NewNotificationLog {
    pub user_id: i64,
    pub incident_id: Option<i64>,
    pub detection_id: Option<i64>,
    pub routing_rule_id: Option<i64>,
    pub channel: ChannelKind,
    pub destination: String,
    pub severity: Option<Severity>,
    pub status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: i64,
}
