//! User accounts: channel destinations, verification flags and quiet-hours
//! preferences.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user of the monitoring service. Inbound webhooks are attributed to a
/// user through the `alert_id` issued when the webhook source was set up.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    #[sqlx(rename = "user_id")]
    pub id: i64,
    /// Identifier embedded in inbound webhook payloads.
    pub alert_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub discord_webhook_url: Option<String>,
    pub discord_verified: bool,
    pub telegram_chat_id: Option<String>,
    pub telegram_verified: bool,
    pub quiet_hours_enabled: bool,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    /// IANA zone name; invalid values fall back to UTC.
    pub quiet_hours_timezone: String,
    /// Whether HIGH severity notifications may override quiet hours.
    pub quiet_hours_override_high: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert form of [`User`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub alert_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
    #[serde(default)]
    pub discord_verified: bool,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default)]
    pub telegram_verified: bool,
    #[serde(default)]
    pub quiet_hours_enabled: bool,
    #[serde(default)]
    pub quiet_hours_start: Option<NaiveTime>,
    #[serde(default)]
    pub quiet_hours_end: Option<NaiveTime>,
    #[serde(default = "default_timezone")]
    pub quiet_hours_timezone: String,
    #[serde(default = "default_override_high")]
    pub quiet_hours_override_high: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_override_high() -> bool {
    true
}

impl User {
    /// Whether the given channel is verified and has a destination.
    pub fn channel_verified(&self, channel: super::ChannelKind) -> bool {
        use super::ChannelKind;
        match channel {
            ChannelKind::Discord => self.discord_verified && self.discord_webhook_url.is_some(),
            ChannelKind::Telegram => self.telegram_verified && self.telegram_chat_id.is_some(),
            ChannelKind::Email => self.email_verified && self.email.is_some(),
            // Custom webhooks only exist on routing rules, never as a
            // default-routing channel.
            ChannelKind::Webhook => false,
        }
    }
}
