use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::NotificationsConfig;

/// HTTP server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the API server binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_address: default_listen_address() }
    }
}

/// Application configuration for Qubic Radar.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// Database URL for the SQLite database.
    pub database_url: String,

    /// Shared secret for verifying inbound webhook signatures. Empty
    /// disables verification.
    #[serde(default)]
    pub webhook_secret: String,

    /// Whether the rule engine evaluates events at all.
    #[serde(default = "default_true")]
    pub rule_evaluation_enabled: bool,

    /// Whether matched incidents are deduplicated by rendered key.
    #[serde(default = "default_true")]
    pub deduplication_enabled: bool,

    /// Notification delivery configuration.
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Loads configuration by layering an optional config file under an
    /// environment-variable source (`RADAR_` prefix, `__` separator).
    pub fn new(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = config_path.unwrap_or("configs/radar");
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("RADAR").separator("__"));

        builder.build()?.try_deserialize()
    }
}
