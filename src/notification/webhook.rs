//! Low-level JSON webhook delivery, shared by every channel. Discord,
//! Telegram and the email provider are all "post JSON to a URL" behind the
//! scenes; user-configured webhooks additionally get an HMAC signature.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_middleware::ClientWithMiddleware;
use sha2::Sha256;

use super::error::NotificationError;

type HmacSha256 = Hmac<Sha256>;

/// Posts JSON payloads to a single endpoint, optionally signing them with a
/// shared secret.
pub struct WebhookNotifier {
    /// Destination URL.
    pub url: String,
    /// Configured HTTP client with retry capabilities.
    pub client: Arc<ClientWithMiddleware>,
    /// Secret used to sign outbound payloads, if any.
    pub secret: Option<String>,
    /// Extra headers, e.g. provider authorization.
    pub headers: HashMap<String, String>,
}

impl WebhookNotifier {
    pub fn new(url: String, client: Arc<ClientWithMiddleware>) -> Self {
        Self { url, client, secret: None, headers: HashMap::new() }
    }

    pub fn with_secret(mut self, secret: String) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn with_header(mut self, name: &str, value: String) -> Self {
        self.headers.insert(name.to_string(), value);
        self
    }

    /// Signs a payload with HMAC-SHA256 over `serialized_payload + timestamp`.
    /// Returns the hex signature and the millisecond timestamp.
    pub fn sign_payload(
        &self,
        secret: &str,
        payload: &serde_json::Value,
    ) -> Result<(String, String), NotificationError> {
        // `HmacSha256::new_from_slice` accepts empty keys, so reject them
        // here.
        if secret.is_empty() {
            return Err(NotificationError::ConfigError(
                "Invalid secret: cannot be empty.".to_string(),
            ));
        }

        let timestamp = Utc::now().timestamp_millis();
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotificationError::ConfigError(format!("Invalid secret: {e}")))?;

        let serialized = serde_json::to_string(payload)?;
        mac.update(format!("{serialized}{timestamp}").as_bytes());

        let signature = hex::encode(mac.finalize().into_bytes());
        Ok((signature, timestamp.to_string()))
    }

    /// Sends a JSON payload, returning an error on any non-2xx response.
    pub async fn notify_json(&self, payload: &serde_json::Value) -> Result<(), NotificationError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );

        if let Some(secret) = &self.secret {
            let (signature, timestamp) = self.sign_payload(secret, payload)?;
            headers.insert(
                HeaderName::from_static("x-signature"),
                HeaderValue::from_str(&signature).map_err(|e| {
                    NotificationError::InternalError(format!("Invalid signature value: {e}"))
                })?,
            );
            headers.insert(
                HeaderName::from_static("x-timestamp"),
                HeaderValue::from_str(&timestamp).map_err(|e| {
                    NotificationError::InternalError(format!("Invalid timestamp value: {e}"))
                })?,
            );
        }

        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                NotificationError::ConfigError(format!("Invalid header name: {key}: {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                NotificationError::ConfigError(format!("Invalid header value for {key}: {e}"))
            })?;
            headers.insert(name, header_value);
        }

        let response =
            self.client.post(self.url.as_str()).headers(headers).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::NotifyFailed(format!(
                "Webhook request failed with status: {status}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    fn test_client() -> Arc<ClientWithMiddleware> {
        Arc::new(reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build())
    }

    #[test]
    fn test_sign_payload_produces_hex_signature() {
        let notifier = WebhookNotifier::new("https://hooks.example.com".to_string(), test_client());
        let (signature, timestamp) =
            notifier.sign_payload("top-secret", &json!({"a": 1})).unwrap();

        assert!(hex::decode(&signature).is_ok());
        assert_eq!(signature.len(), 64);
        assert!(timestamp.parse::<i64>().is_ok());
    }

    #[test]
    fn test_sign_payload_rejects_empty_secret() {
        let notifier = WebhookNotifier::new("https://hooks.example.com".to_string(), test_client());
        let result = notifier.sign_payload("", &json!({"a": 1}));
        assert!(matches!(result, Err(NotificationError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_notify_includes_signature_headers_when_secret_set() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("X-Signature", Matcher::Regex("^[0-9a-f]{64}$".to_string()))
            .match_header("X-Timestamp", Matcher::Regex("^[0-9]+$".to_string()))
            .match_header("Content-Type", "application/json")
            .with_status(200)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(server.url(), test_client())
            .with_secret("top-secret".to_string());
        notifier.notify_json(&json!({"hello": "world"})).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_notify_sends_custom_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("Authorization", "Bearer token-123")
            .with_status(200)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(server.url(), test_client())
            .with_header("Authorization", "Bearer token-123".to_string());
        notifier.notify_json(&json!({})).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_notify_surfaces_http_failure() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/").with_status(500).create_async().await;

        let notifier = WebhookNotifier::new(server.url(), test_client());
        let result = notifier.notify_json(&json!({})).await;
        assert!(matches!(result, Err(NotificationError::NotifyFailed(_))));
    }
}
