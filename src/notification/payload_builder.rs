//! # Channel Payload Builders
//!
//! Each delivery channel wants its own JSON structure: Discord takes an
//! embed, Telegram takes a `sendMessage` body with HTML text, the email
//! provider takes a transactional-send request, and custom webhooks take a
//! machine-readable summary. The builders here construct those payloads from
//! one channel-agnostic [`AlertContent`].

use serde_json::{Value, json};

use crate::models::{Detection, Incident, Severity};

/// Channel-agnostic notification content, rendered per channel by the
/// builders below.
#[derive(Debug, Clone)]
pub struct AlertContent {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

impl AlertContent {
    /// Content for a single AI detection.
    pub fn from_detection(detection: &Detection) -> Self {
        let body = format!(
            "Severity: {}\nCategory: {}\nAnomaly score: {:.2}\nConfidence: {:.2}\n\n{}",
            detection.severity,
            detection.primary_category,
            detection.anomaly_score,
            detection.confidence,
            detection.summary,
        );
        Self {
            title: format!("{} {} detection", detection.severity.emoji(), detection.severity),
            body,
            severity: detection.severity,
        }
    }

    /// Content for a rule-engine incident.
    pub fn from_incident(incident: &Incident) -> Self {
        Self {
            title: format!("{} {}", incident.severity.emoji(), incident.title),
            body: incident.description.clone().unwrap_or_else(|| incident.kind.clone()),
            severity: incident.severity,
        }
    }

    /// Content for a batched digest message. The body is pre-formatted by
    /// the batcher.
    pub fn digest(severity: Severity, count: usize, body: String) -> Self {
        Self {
            title: format!("{} {} {} ALERTS (Batched)", severity.emoji(), count, severity),
            body,
            severity,
        }
    }
}

/// A trait for building channel-specific notification payloads.
pub trait ChannelPayloadBuilder: Send + Sync {
    /// Builds the JSON payload the channel endpoint expects.
    fn build_payload(&self, content: &AlertContent) -> Value;
}

/// Builds Discord webhook payloads using an embed with a severity color.
pub struct DiscordPayloadBuilder;

impl DiscordPayloadBuilder {
    fn severity_color(severity: Severity) -> u32 {
        match severity {
            Severity::Critical => 0xE74C3C,
            Severity::High => 0xE67E22,
            Severity::Medium => 0x3498DB,
            Severity::Low => 0x2ECC71,
            Severity::Info => 0x95A5A6,
        }
    }
}

impl ChannelPayloadBuilder for DiscordPayloadBuilder {
    fn build_payload(&self, content: &AlertContent) -> Value {
        json!({
            "embeds": [{
                "title": content.title,
                "description": content.body,
                "color": Self::severity_color(content.severity),
            }]
        })
    }
}

/// Builds Telegram `sendMessage` payloads with HTML formatting.
pub struct TelegramPayloadBuilder {
    /// The chat ID to send the message to.
    pub chat_id: String,
}

impl ChannelPayloadBuilder for TelegramPayloadBuilder {
    fn build_payload(&self, content: &AlertContent) -> Value {
        let text =
            format!("<b>{}</b>\n\n{}", escape_html(&content.title), escape_html(&content.body));
        json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        })
    }
}

/// Builds transactional-email send requests (SendGrid-compatible shape).
pub struct EmailPayloadBuilder {
    pub to_email: String,
    pub from_email: String,
    pub from_name: String,
}

impl ChannelPayloadBuilder for EmailPayloadBuilder {
    fn build_payload(&self, content: &AlertContent) -> Value {
        json!({
            "personalizations": [{ "to": [{ "email": self.to_email }] }],
            "from": { "email": self.from_email, "name": self.from_name },
            "subject": content.title,
            "content": [{ "type": "text/plain", "value": content.body }],
        })
    }
}

/// The machine-readable summary sent to user-configured webhooks. These
/// consumers integrate programmatically, so the payload carries fields, not
/// prose.
pub fn detection_webhook_payload(detection: &Detection) -> Value {
    json!({
        "detection_id": detection.id,
        "severity": detection.severity,
        "category": detection.primary_category,
        "anomaly_score": detection.anomaly_score,
        "confidence": detection.confidence,
        "summary": detection.summary,
        "timestamp": detection.created_at.to_rfc3339(),
    })
}

/// Summary payload for incidents delivered to custom webhooks.
pub fn incident_webhook_payload(incident: &Incident) -> Value {
    json!({
        "incident_id": incident.id,
        "severity": incident.severity,
        "kind": incident.kind,
        "title": incident.title,
        "description": incident.description,
        "timestamp": incident.created_at.to_rfc3339(),
    })
}

/// Escapes the characters Telegram's HTML parse mode requires.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> AlertContent {
        AlertContent {
            title: "Whale Transfer: 5,000,000 QUBIC".to_string(),
            body: "Amount > 1M & flagged".to_string(),
            severity: Severity::Critical,
        }
    }

    #[test]
    fn test_discord_payload_is_an_embed() {
        let payload = DiscordPayloadBuilder.build_payload(&content());
        assert_eq!(payload["embeds"][0]["title"], "Whale Transfer: 5,000,000 QUBIC");
        assert_eq!(payload["embeds"][0]["color"], 0xE74C3C);
    }

    #[test]
    fn test_telegram_payload_escapes_html() {
        let builder = TelegramPayloadBuilder { chat_id: "12345".to_string() };
        let payload = builder.build_payload(&AlertContent {
            title: "a < b".to_string(),
            body: "x & y > z".to_string(),
            severity: Severity::Medium,
        });
        assert_eq!(payload["chat_id"], "12345");
        assert_eq!(payload["parse_mode"], "HTML");
        let text = payload["text"].as_str().unwrap();
        assert!(text.contains("a &lt; b"));
        assert!(text.contains("x &amp; y &gt; z"));
    }

    #[test]
    fn test_email_payload_shape() {
        let builder = EmailPayloadBuilder {
            to_email: "user@example.com".to_string(),
            from_email: "alerts@qubicradar.io".to_string(),
            from_name: "Qubic Radar".to_string(),
        };
        let payload = builder.build_payload(&content());
        assert_eq!(payload["personalizations"][0]["to"][0]["email"], "user@example.com");
        assert_eq!(payload["from"]["email"], "alerts@qubicradar.io");
        assert_eq!(payload["subject"], "Whale Transfer: 5,000,000 QUBIC");
    }
}
