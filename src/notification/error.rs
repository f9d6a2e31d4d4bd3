//! Error types for the notification service.

use thiserror::Error;

use crate::http_client::HttpClientPoolError;

/// Defines the possible errors that can occur while delivering notifications.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// An error related to invalid or missing channel configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A payload could not be serialized.
    #[error("Failed to serialize payload: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The channel endpoint rejected or failed the delivery.
    #[error("Notification failed: {0}")]
    NotifyFailed(String),

    /// An internal error that should not occur under normal circumstances.
    #[error("Internal error: {0}")]
    InternalError(String),

    /// An error originating from the HTTP client pool.
    #[error("HTTP client error")]
    HttpClientError(#[from] HttpClientPoolError),

    /// An error from the underlying `reqwest` or `reqwest_middleware`
    /// libraries.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest_middleware::Error),
}
