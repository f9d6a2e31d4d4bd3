//! Notification delivery configuration: provider credentials, the default
//! severity-to-channel routing table and batching intervals.

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use super::helpers::{deserialize_duration_from_seconds, serialize_duration_to_seconds};
use crate::models::{ChannelKind, Severity};

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; empty disables the Telegram channel.
    #[serde(default)]
    pub bot_token: String,
    /// API base, overridable for tests.
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self { bot_token: String::new(), api_base: default_telegram_api_base() }
    }
}

impl TelegramConfig {
    /// The `sendMessage` endpoint for the configured bot.
    pub fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

/// Transactional-email HTTP API settings (SendGrid-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailProviderConfig {
    /// Send endpoint; empty disables the email channel.
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_from_email() -> String {
    "alerts@qubicradar.io".to_string()
}

fn default_from_name() -> String {
    "Qubic Radar".to_string()
}

impl Default for EmailProviderConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

/// Batching intervals and size limits per severity. CRITICAL and HIGH never
/// batch and intentionally have no entries here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// How often the background loop checks for due batches.
    #[serde(
        default = "default_check_interval",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub check_interval: Duration,
    /// Flush interval per severity, in seconds.
    #[serde(default = "default_batch_intervals")]
    pub intervals_secs: HashMap<Severity, u64>,
    /// Queue size that forces an immediate flush, per severity.
    #[serde(default = "default_max_batch_sizes")]
    pub max_sizes: HashMap<Severity, usize>,
}

fn default_check_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_batch_intervals() -> HashMap<Severity, u64> {
    HashMap::from([(Severity::Medium, 300), (Severity::Low, 1800), (Severity::Info, 3600)])
}

fn default_max_batch_sizes() -> HashMap<Severity, usize> {
    HashMap::from([(Severity::Medium, 10), (Severity::Low, 20), (Severity::Info, 50)])
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            intervals_secs: default_batch_intervals(),
            max_sizes: default_max_batch_sizes(),
        }
    }
}

impl BatcherConfig {
    /// Flush interval for a batched severity. Falls back to the MEDIUM
    /// default for severities missing from the table.
    pub fn interval_for(&self, severity: Severity) -> Duration {
        Duration::from_secs(self.intervals_secs.get(&severity).copied().unwrap_or(300))
    }

    /// Max queue size before a forced flush.
    pub fn max_size_for(&self, severity: Severity) -> usize {
        self.max_sizes.get(&severity).copied().unwrap_or(50)
    }
}

/// Top-level notification configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub email: EmailProviderConfig,
    #[serde(default)]
    pub batcher: BatcherConfig,
    /// Severity-to-channel map used when a user has no matching routing
    /// rules. Kept as configuration so deployments can tune it without code
    /// changes.
    #[serde(default = "default_routing")]
    pub default_routing: HashMap<Severity, Vec<ChannelKind>>,
    /// Retry policy for all outbound channel deliveries.
    #[serde(default)]
    pub http_retry: super::HttpRetryConfig,
}

fn default_routing() -> HashMap<Severity, Vec<ChannelKind>> {
    HashMap::from([
        (
            Severity::Critical,
            vec![ChannelKind::Discord, ChannelKind::Telegram, ChannelKind::Email],
        ),
        (Severity::High, vec![ChannelKind::Discord, ChannelKind::Telegram]),
        (Severity::Medium, vec![ChannelKind::Telegram]),
        // LOW and INFO are digest-only.
        (Severity::Low, vec![]),
        (Severity::Info, vec![]),
    ])
}

impl NotificationsConfig {
    /// Default channels for a severity when no routing rules match.
    pub fn default_channels(&self, severity: Severity) -> &[ChannelKind] {
        self.default_routing.get(&severity).map(Vec::as_slice).unwrap_or(&[])
    }
}
