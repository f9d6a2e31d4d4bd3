//! Handlers for the webhook ingress endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use super::{ApiError, ApiState};

type HmacSha256 = Hmac<Sha256>;

/// Verifies the `X-Signature` header against the raw request body.
///
/// The signature is a hex HMAC-SHA256 over the body, compared in constant
/// time. Verification is skipped entirely when no secret is configured.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    if secret.is_empty() {
        return true;
    }
    let Some(signature) = signature else {
        return false;
    };
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `POST /webhook/qubic/events`: ingests one event from the upstream alert
/// provider and runs it through the pipeline.
pub async fn receive_qubic_event(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers.get("X-Signature").and_then(|v| v.to_str().ok());

    if !verify_webhook_signature(&state.webhook_secret, &body, signature) {
        tracing::warn!("Invalid webhook signature.");
        return Err(ApiError::Unauthorized);
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON payload: {e}")))?;

    tracing::info!(
        alert_id = payload.get("alert_id").and_then(|v| v.as_str()).unwrap_or("unknown"),
        event_type = payload.get("event_type").and_then(|v| v.as_str()).unwrap_or("unknown"),
        "Webhook received."
    );

    let outcome = state
        .pipeline
        .process_webhook_event(payload, signature.map(str::to_string))
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "event_id": outcome.event_id,
            "normalized_event_id": outcome.normalized_event_id,
            "incidents_created": outcome.incidents_created,
        })),
    ))
}

/// `GET /webhook/health`: liveness probe for the ingestion path.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "webhook_ingestion" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signature_skipped_without_secret() {
        assert!(verify_webhook_signature("", b"{}", None));
        assert!(verify_webhook_signature("", b"{}", Some("garbage")));
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"alert_id":"a"}"#;
        let signature = sign("secret", body);
        assert!(verify_webhook_signature("secret", body, Some(&signature)));
    }

    #[test]
    fn test_missing_or_wrong_signature_rejected() {
        let body = br#"{"alert_id":"a"}"#;
        assert!(!verify_webhook_signature("secret", body, None));
        assert!(!verify_webhook_signature("secret", body, Some("not-hex")));

        let wrong = sign("other-secret", body);
        assert!(!verify_webhook_signature("secret", body, Some(&wrong)));
    }

    #[test]
    fn test_signature_is_over_exact_body() {
        let signature = sign("secret", br#"{"alert_id":"a"}"#);
        assert!(!verify_webhook_signature("secret", br#"{"alert_id":"b"}"#, Some(&signature)));
    }
}
