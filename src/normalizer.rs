//! Converts raw webhook payloads into the canonical normalized event form.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;

use crate::models::NewNormalizedEvent;

/// Errors produced while normalizing a raw payload.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// The payload is not a JSON object.
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// The payload carries no usable event name.
    #[error("Payload has no event_type or method field")]
    MissingEventName,
}

/// Normalizes EasyConnect webhook payloads (and a generic fallback shape)
/// into [`NewNormalizedEvent`]s.
pub struct EventNormalizer;

impl EventNormalizer {
    /// Normalizes a raw payload, picking the EasyConnect mapping when the
    /// payload looks like one and the generic mapping otherwise.
    pub fn normalize(payload: &Value) -> Result<NewNormalizedEvent, NormalizeError> {
        let obj = payload.as_object().ok_or(NormalizeError::NotAnObject)?;
        if obj.contains_key("event_type") || obj.contains_key("method") {
            Self::normalize_easyconnect(payload)
        } else {
            Self::normalize_generic(payload)
        }
    }

    /// Converts an EasyConnect webhook payload into the canonical form.
    ///
    /// Timestamps are handled leniently: absent or unparsable values fall
    /// back to the current time rather than failing the event.
    pub fn normalize_easyconnect(payload: &Value) -> Result<NewNormalizedEvent, NormalizeError> {
        let obj = payload.as_object().ok_or(NormalizeError::NotAnObject)?;

        let event_name = non_empty_str(payload, "event_type")
            .or_else(|| non_empty_str(payload, "method"))
            .ok_or(NormalizeError::MissingEventName)?;

        let normalized = NewNormalizedEvent {
            event_id: None,
            chain: "QUBIC".to_string(),
            contract_address: non_empty_str(payload, "contract_address"),
            contract_label: non_empty_str(payload, "contract_name"),
            event_name,
            tx_hash: non_empty_str(payload, "tx_hash"),
            tx_status: non_empty_str(payload, "status").unwrap_or_else(|| "unknown".to_string()),
            from_address: non_empty_str(payload, "from_address"),
            to_address: non_empty_str(payload, "to_address"),
            amount: payload.get("amount").and_then(Value::as_i64),
            token_symbol: non_empty_str(payload, "token_symbol")
                .unwrap_or_else(|| "QUBIC".to_string()),
            block_height: payload.get("block_height").and_then(Value::as_i64),
            tick: payload.get("tick").and_then(Value::as_i64),
            timestamp: parse_timestamp(payload.get("timestamp")),
            metadata: json!({
                "alert_id": obj.get("alert_id"),
                "contract_index": obj.get("contract_index"),
                "procedure": obj.get("procedure"),
                "price": obj.get("price"),
                "quantity": obj.get("quantity"),
                "metadata": obj.get("metadata").cloned().unwrap_or_else(|| json!({})),
            }),
        };

        tracing::info!(
            event_name = %normalized.event_name,
            contract = normalized.contract_label.as_deref().unwrap_or(""),
            "Normalized EasyConnect event."
        );

        Ok(normalized)
    }

    /// Fallback mapping for payloads from other webhook sources. The whole
    /// payload is preserved as metadata.
    pub fn normalize_generic(payload: &Value) -> Result<NewNormalizedEvent, NormalizeError> {
        if !payload.is_object() {
            return Err(NormalizeError::NotAnObject);
        }

        let event_name =
            non_empty_str(payload, "event").ok_or(NormalizeError::MissingEventName)?;

        Ok(NewNormalizedEvent {
            event_id: None,
            chain: non_empty_str(payload, "chain").unwrap_or_else(|| "QUBIC".to_string()),
            contract_address: non_empty_str(payload, "contract"),
            contract_label: non_empty_str(payload, "protocol"),
            event_name,
            tx_hash: non_empty_str(payload, "transaction_hash"),
            tx_status: non_empty_str(payload, "status").unwrap_or_else(|| "unknown".to_string()),
            from_address: non_empty_str(payload, "from"),
            to_address: non_empty_str(payload, "to"),
            amount: payload.get("value").and_then(Value::as_i64),
            token_symbol: non_empty_str(payload, "token").unwrap_or_else(|| "QUBIC".to_string()),
            block_height: None,
            tick: None,
            timestamp: Utc::now(),
            metadata: payload.clone(),
        })
    }
}

fn non_empty_str(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_easyconnect_payload_maps_canonical_fields() {
        let payload = json!({
            "alert_id": "alert-1",
            "event_type": "Transfer",
            "contract_address": "QX_CONTRACT",
            "contract_name": "QX",
            "tx_hash": "deadbeef",
            "status": "success",
            "from_address": "SENDER",
            "to_address": "RECIPIENT",
            "amount": 5_000_000,
            "tick": 123456,
            "timestamp": "2026-08-01T12:00:00Z"
        });

        let event = EventNormalizer::normalize(&payload).unwrap();
        assert_eq!(event.chain, "QUBIC");
        assert_eq!(event.event_name, "Transfer");
        assert_eq!(event.contract_label.as_deref(), Some("QX"));
        assert_eq!(event.amount, Some(5_000_000));
        assert_eq!(event.tick, Some(123456));
        assert_eq!(event.token_symbol, "QUBIC");
        assert_eq!(event.timestamp.to_rfc3339(), "2026-08-01T12:00:00+00:00");
        assert_eq!(event.metadata["alert_id"], "alert-1");
    }

    #[test]
    fn test_method_used_when_event_type_absent() {
        let payload = json!({ "method": "qx_placeOrder" });
        let event = EventNormalizer::normalize(&payload).unwrap();
        assert_eq!(event.event_name, "qx_placeOrder");
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let before = Utc::now();
        let event =
            EventNormalizer::normalize(&json!({ "event_type": "Transfer" })).unwrap();
        assert!(event.timestamp >= before);
        assert!(event.timestamp <= Utc::now());
    }

    #[test]
    fn test_unparsable_timestamp_defaults_to_now() {
        let before = Utc::now();
        let event = EventNormalizer::normalize(&json!({
            "event_type": "Transfer",
            "timestamp": "yesterday-ish"
        }))
        .unwrap();
        assert!(event.timestamp >= before);
    }

    #[test]
    fn test_missing_event_name_is_an_error() {
        let result = EventNormalizer::normalize(&json!({ "amount": 1 }));
        assert!(matches!(result, Err(NormalizeError::MissingEventName)));
    }

    #[test]
    fn test_non_object_payload_is_an_error() {
        let result = EventNormalizer::normalize(&json!([1, 2, 3]));
        assert!(matches!(result, Err(NormalizeError::NotAnObject)));
    }

    #[test]
    fn test_generic_fallback_keeps_whole_payload_as_metadata() {
        let payload = json!({
            "event": "Swap",
            "chain": "OTHER",
            "contract": "0xabc",
            "from": "A",
            "to": "B",
            "value": 42
        });

        let event = EventNormalizer::normalize(&payload).unwrap();
        assert_eq!(event.chain, "OTHER");
        assert_eq!(event.event_name, "Swap");
        assert_eq!(event.amount, Some(42));
        assert_eq!(event.metadata, payload);
    }
}
