//! # Notification Service
//!
//! Routes detections and incidents to the user's delivery channels. Routing
//! follows the user's enabled routing rules for the severity (highest
//! priority first, all matching rules execute); users without matching rules
//! fall back to the configured default severity-to-channel table, gated by
//! per-channel verification.
//!
//! Every delivery attempt, successful or not, is recorded as a
//! `NotificationLog` row. A failing channel never affects the others and
//! never propagates out of the router.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;

use crate::{
    config::NotificationsConfig,
    http_client::HttpClientPool,
    models::{
        ChannelKind, DeliveryStatus, Detection, Incident, NewNotificationLog, RoutingRule,
        Severity, User,
    },
    persistence::traits::AppRepository,
};

pub mod batcher;
pub mod error;
pub mod payload_builder;
pub mod webhook;

use error::NotificationError;
use payload_builder::{
    AlertContent, ChannelPayloadBuilder, DiscordPayloadBuilder, EmailPayloadBuilder,
    TelegramPayloadBuilder, detection_webhook_payload, incident_webhook_payload,
};
use webhook::WebhookNotifier;

/// What is being notified about. Detections and incidents share the routing
/// logic but render differently.
#[derive(Clone, Copy)]
pub enum AlertSource<'a> {
    Detection(&'a Detection),
    Incident(&'a Incident),
}

impl AlertSource<'_> {
    fn severity(&self) -> Severity {
        match self {
            AlertSource::Detection(d) => d.severity,
            AlertSource::Incident(i) => i.severity,
        }
    }

    fn content(&self) -> AlertContent {
        match self {
            AlertSource::Detection(d) => AlertContent::from_detection(d),
            AlertSource::Incident(i) => AlertContent::from_incident(i),
        }
    }

    fn webhook_payload(&self) -> serde_json::Value {
        match self {
            AlertSource::Detection(d) => detection_webhook_payload(d),
            AlertSource::Incident(i) => incident_webhook_payload(i),
        }
    }

    fn detection_id(&self) -> Option<i64> {
        match self {
            AlertSource::Detection(d) => Some(d.id),
            AlertSource::Incident(_) => None,
        }
    }

    fn incident_id(&self) -> Option<i64> {
        match self {
            AlertSource::Detection(_) => None,
            AlertSource::Incident(i) => Some(i.id),
        }
    }
}

/// A resolved delivery target for one channel.
struct ChannelTarget {
    kind: ChannelKind,
    destination: String,
    webhook_secret: Option<String>,
    routing_rule_id: Option<i64>,
}

/// Routes alerts to delivery channels and records the audit trail.
pub struct NotificationRouter<R: AppRepository> {
    repository: Arc<R>,
    http_pool: Arc<HttpClientPool>,
    config: NotificationsConfig,
}

impl<R: AppRepository> NotificationRouter<R> {
    pub fn new(
        repository: Arc<R>,
        http_pool: Arc<HttpClientPool>,
        config: NotificationsConfig,
    ) -> Self {
        Self { repository, http_pool, config }
    }

    /// Routes a detection. Returns per-channel delivery outcomes.
    pub async fn route_detection(
        &self,
        detection: &Detection,
        user: &User,
    ) -> HashMap<ChannelKind, bool> {
        self.route(AlertSource::Detection(detection), user).await
    }

    /// Routes a rule-engine incident. Returns per-channel delivery outcomes.
    pub async fn route_incident(
        &self,
        incident: &Incident,
        user: &User,
    ) -> HashMap<ChannelKind, bool> {
        self.route(AlertSource::Incident(incident), user).await
    }

    async fn route(&self, source: AlertSource<'_>, user: &User) -> HashMap<ChannelKind, bool> {
        let severity = source.severity();

        let rules = match self.repository.get_matching_routing_rules(user.id, severity).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(user_id = user.id, error = %e, "Failed to load routing rules.");
                Vec::new()
            }
        };

        let targets = if rules.is_empty() {
            tracing::debug!(user_id = user.id, severity = %severity, "Using default routing.");
            self.default_targets(severity, user)
        } else {
            rules.iter().flat_map(|rule| rule_targets(rule, user)).collect()
        };

        let content = source.content();
        let mut results = HashMap::new();
        for target in targets {
            let outcome = self.deliver(&target, &content, &source).await;
            let success = match outcome {
                Ok(()) => true,
                Err(ref e) => {
                    tracing::error!(
                        channel = %target.kind,
                        user_id = user.id,
                        error = %e,
                        "Channel delivery failed."
                    );
                    false
                }
            };
            self.log_delivery(user, &source, &target, outcome.err().map(|e| e.to_string())).await;
            results.insert(target.kind, success);
        }

        tracing::info!(
            user_id = user.id,
            severity = %severity,
            channels = results.len(),
            "Alert routed."
        );
        results
    }

    /// Targets from the default severity-to-channel table, gated by the
    /// user's per-channel verification.
    fn default_targets(&self, severity: Severity, user: &User) -> Vec<ChannelTarget> {
        self.config
            .default_channels(severity)
            .iter()
            .filter(|channel| user.channel_verified(**channel))
            .filter_map(|channel| {
                let destination = match channel {
                    ChannelKind::Discord => user.discord_webhook_url.clone(),
                    ChannelKind::Telegram => user.telegram_chat_id.clone(),
                    ChannelKind::Email => user.email.clone(),
                    ChannelKind::Webhook => None,
                }?;
                Some(ChannelTarget {
                    kind: *channel,
                    destination,
                    webhook_secret: None,
                    routing_rule_id: None,
                })
            })
            .collect()
    }

    async fn deliver(
        &self,
        target: &ChannelTarget,
        content: &AlertContent,
        source: &AlertSource<'_>,
    ) -> Result<(), NotificationError> {
        match target.kind {
            ChannelKind::Discord => self.send_discord(&target.destination, content).await,
            ChannelKind::Telegram => self.send_telegram(&target.destination, content).await,
            ChannelKind::Email => self.send_email(&target.destination, content).await,
            ChannelKind::Webhook => {
                self.send_webhook(
                    &target.destination,
                    target.webhook_secret.as_deref(),
                    &source.webhook_payload(),
                )
                .await
            }
        }
    }

    async fn send_discord(
        &self,
        webhook_url: &str,
        content: &AlertContent,
    ) -> Result<(), NotificationError> {
        let client = self.http_pool.get_or_create(&self.config.http_retry).await?;
        let notifier = WebhookNotifier::new(webhook_url.to_string(), client);
        notifier.notify_json(&DiscordPayloadBuilder.build_payload(content)).await
    }

    /// Sends one message to a Telegram chat. Also used by the batcher for
    /// digest delivery.
    pub async fn send_telegram(
        &self,
        chat_id: &str,
        content: &AlertContent,
    ) -> Result<(), NotificationError> {
        if self.config.telegram.bot_token.is_empty() {
            return Err(NotificationError::ConfigError(
                "Telegram bot token not configured".to_string(),
            ));
        }
        let client = self.http_pool.get_or_create(&self.config.http_retry).await?;
        let notifier = WebhookNotifier::new(self.config.telegram.send_message_url(), client);
        let builder = TelegramPayloadBuilder { chat_id: chat_id.to_string() };
        notifier.notify_json(&builder.build_payload(content)).await
    }

    async fn send_email(
        &self,
        to_email: &str,
        content: &AlertContent,
    ) -> Result<(), NotificationError> {
        if self.config.email.api_url.is_empty() {
            return Err(NotificationError::ConfigError(
                "Email provider not configured".to_string(),
            ));
        }
        let client = self.http_pool.get_or_create(&self.config.http_retry).await?;
        let notifier = WebhookNotifier::new(self.config.email.api_url.clone(), client)
            .with_header("Authorization", format!("Bearer {}", self.config.email.api_key));
        let builder = EmailPayloadBuilder {
            to_email: to_email.to_string(),
            from_email: self.config.email.from_email.clone(),
            from_name: self.config.email.from_name.clone(),
        };
        notifier.notify_json(&builder.build_payload(content)).await
    }

    async fn send_webhook(
        &self,
        url: &str,
        secret: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        let client = self.http_pool.get_or_create(&self.config.http_retry).await?;
        let mut notifier = WebhookNotifier::new(url.to_string(), client);
        if let Some(secret) = secret {
            notifier = notifier.with_secret(secret.to_string());
        }
        notifier.notify_json(payload).await
    }

    /// Records the delivery attempt. Log-write failures are logged, never
    /// propagated.
    async fn log_delivery(
        &self,
        user: &User,
        source: &AlertSource<'_>,
        target: &ChannelTarget,
        error_message: Option<String>,
    ) {
        let status =
            if error_message.is_none() { DeliveryStatus::Sent } else { DeliveryStatus::Failed };
        let log = NewNotificationLog {
            user_id: user.id,
            incident_id: source.incident_id(),
            detection_id: source.detection_id(),
            routing_rule_id: target.routing_rule_id,
            channel: target.kind,
            destination: target.destination.clone(),
            severity: Some(source.severity()),
            status,
            delivered_at: (status == DeliveryStatus::Sent).then(Utc::now),
            error_message,
            retry_count: 0,
        };
        if let Err(e) = self.repository.insert_notification_log(&log).await {
            tracing::error!(user_id = user.id, error = %e, "Failed to write notification log.");
        }
    }
}

/// Expands a routing rule into concrete targets, gated by the user's channel
/// verification.
fn rule_targets(rule: &RoutingRule, user: &User) -> Vec<ChannelTarget> {
    let mut targets = Vec::new();

    if let Some(url) = &rule.discord_webhook_url {
        if user.discord_verified {
            targets.push(ChannelTarget {
                kind: ChannelKind::Discord,
                destination: url.clone(),
                webhook_secret: None,
                routing_rule_id: Some(rule.id),
            });
        }
    }

    if let Some(chat_id) = &rule.telegram_chat_id {
        if user.telegram_verified {
            targets.push(ChannelTarget {
                kind: ChannelKind::Telegram,
                destination: chat_id.clone(),
                webhook_secret: None,
                routing_rule_id: Some(rule.id),
            });
        }
    }

    if rule.email_enabled {
        if let Some(email) = &user.email {
            targets.push(ChannelTarget {
                kind: ChannelKind::Email,
                destination: email.clone(),
                webhook_secret: None,
                routing_rule_id: Some(rule.id),
            });
        }
    }

    if let Some(url) = &rule.webhook_url {
        targets.push(ChannelTarget {
            kind: ChannelKind::Webhook,
            destination: url.clone(),
            webhook_secret: rule.webhook_secret.clone(),
            routing_rule_id: Some(rule.id),
        });
    }

    targets
}

#[cfg(test)]
mod tests {
    use sqlx::types::Json;

    use super::*;
    use crate::{
        config::TelegramConfig,
        models::{NotificationFormat, Scope},
        persistence::traits::MockAppRepository,
    };

    fn verified_user() -> User {
        User {
            id: 1,
            alert_id: "alert-1".to_string(),
            email: Some("user@example.com".to_string()),
            email_verified: true,
            discord_webhook_url: Some("https://discord.example/hook".to_string()),
            discord_verified: true,
            telegram_chat_id: Some("12345".to_string()),
            telegram_verified: true,
            quiet_hours_enabled: false,
            quiet_hours_start: None,
            quiet_hours_end: None,
            quiet_hours_timezone: "UTC".to_string(),
            quiet_hours_override_high: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn detection(severity: Severity) -> Detection {
        Detection {
            id: 5,
            normalized_event_id: 7,
            user_id: 1,
            anomaly_score: 0.9,
            confidence: 0.8,
            severity,
            primary_category: "WhaleActivity".to_string(),
            sub_categories: Json(vec![]),
            scope: Scope::Network,
            summary: "Large transfer".to_string(),
            detailed_analysis: None,
            detected_patterns: Json(vec![]),
            risk_factors: Json(vec![]),
            recommendations: Json(vec![]),
            related_addresses: Json(vec![]),
            model_version: None,
            created_at: Utc::now(),
        }
    }

    fn router_with(
        mock: MockAppRepository,
        config: NotificationsConfig,
    ) -> NotificationRouter<MockAppRepository> {
        NotificationRouter::new(Arc::new(mock), Arc::new(HttpClientPool::new()), config)
    }

    #[tokio::test]
    async fn test_default_routing_skips_unverified_channels() {
        let mut server = mockito::Server::new_async().await;
        let telegram_mock = server
            .mock("POST", "/bottoken/sendMessage")
            .with_status(200)
            .create_async()
            .await;

        let mut user = verified_user();
        user.discord_verified = false;
        user.email_verified = false;

        let mut mock = MockAppRepository::new();
        mock.expect_get_matching_routing_rules().returning(|_, _| Ok(vec![]));
        mock.expect_insert_notification_log()
            .withf(|log| {
                log.channel == ChannelKind::Telegram && log.status == DeliveryStatus::Sent
            })
            .returning(|log| {
                Ok(crate::models::NotificationLog {
                    id: 1,
                    user_id: log.user_id,
                    incident_id: log.incident_id,
                    detection_id: log.detection_id,
                    routing_rule_id: log.routing_rule_id,
                    channel: log.channel,
                    destination: log.destination.clone(),
                    severity: log.severity,
                    status: log.status,
                    delivered_at: log.delivered_at,
                    error_message: log.error_message.clone(),
                    retry_count: log.retry_count,
                    created_at: Utc::now(),
                })
            });

        let config = NotificationsConfig {
            telegram: TelegramConfig {
                bot_token: "token".to_string(),
                api_base: server.url(),
            },
            ..Default::default()
        };

        let router = router_with(mock, config);
        // CRITICAL defaults to discord+telegram+email, but only Telegram is
        // verified here.
        let results = router.route_detection(&detection(Severity::Critical), &user).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results.get(&ChannelKind::Telegram), Some(&true));
        telegram_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_channel_logged_and_contained() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/bottoken/sendMessage").with_status(500).create_async().await;

        let mut user = verified_user();
        user.discord_verified = false;
        user.email_verified = false;

        let mut mock = MockAppRepository::new();
        mock.expect_get_matching_routing_rules().returning(|_, _| Ok(vec![]));
        mock.expect_insert_notification_log()
            .withf(|log| {
                log.status == DeliveryStatus::Failed
                    && log.error_message.is_some()
                    && log.delivered_at.is_none()
            })
            .returning(|log| {
                Ok(crate::models::NotificationLog {
                    id: 1,
                    user_id: log.user_id,
                    incident_id: log.incident_id,
                    detection_id: log.detection_id,
                    routing_rule_id: log.routing_rule_id,
                    channel: log.channel,
                    destination: log.destination.clone(),
                    severity: log.severity,
                    status: log.status,
                    delivered_at: log.delivered_at,
                    error_message: log.error_message.clone(),
                    retry_count: log.retry_count,
                    created_at: Utc::now(),
                })
            });

        let config = NotificationsConfig {
            telegram: TelegramConfig {
                bot_token: "token".to_string(),
                api_base: server.url(),
            },
            ..Default::default()
        };

        let router = router_with(mock, config);
        let results = router.route_detection(&detection(Severity::Medium), &user).await;

        assert_eq!(results.get(&ChannelKind::Telegram), Some(&false));
    }

    #[tokio::test]
    async fn test_routing_rule_webhook_executes() {
        let mut server = mockito::Server::new_async().await;
        let webhook_mock = server
            .mock("POST", "/hook")
            .match_header("X-Signature", mockito::Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let rule = RoutingRule {
            id: 9,
            user_id: 1,
            severity: Severity::High,
            incident_type: None,
            scope: None,
            discord_webhook_url: None,
            telegram_chat_id: None,
            email_enabled: false,
            webhook_url: Some(format!("{}/hook", server.url())),
            webhook_secret: Some("shared".to_string()),
            notification_format: NotificationFormat::Minimal,
            priority: 5,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut mock = MockAppRepository::new();
        mock.expect_get_matching_routing_rules().returning(move |_, _| Ok(vec![rule.clone()]));
        mock.expect_insert_notification_log()
            .withf(|log| log.channel == ChannelKind::Webhook && log.routing_rule_id == Some(9))
            .returning(|log| {
                Ok(crate::models::NotificationLog {
                    id: 1,
                    user_id: log.user_id,
                    incident_id: log.incident_id,
                    detection_id: log.detection_id,
                    routing_rule_id: log.routing_rule_id,
                    channel: log.channel,
                    destination: log.destination.clone(),
                    severity: log.severity,
                    status: log.status,
                    delivered_at: log.delivered_at,
                    error_message: log.error_message.clone(),
                    retry_count: log.retry_count,
                    created_at: Utc::now(),
                })
            });

        let router = router_with(mock, NotificationsConfig::default());
        let results = router.route_detection(&detection(Severity::High), &verified_user()).await;

        assert_eq!(results.get(&ChannelKind::Webhook), Some(&true));
        webhook_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_low_severity_defaults_route_nowhere() {
        let mut mock = MockAppRepository::new();
        mock.expect_get_matching_routing_rules().returning(|_, _| Ok(vec![]));
        mock.expect_insert_notification_log().never();

        let router = router_with(mock, NotificationsConfig::default());
        let results = router.route_detection(&detection(Severity::Low), &verified_user()).await;
        assert!(results.is_empty());
    }
}
