//! # Notification Batcher
//!
//! Collapses lower-severity detections into periodic digest messages so a
//! noisy network never floods a user's channels. CRITICAL alerts always go
//! out immediately, HIGH goes out immediately unless the user's quiet hours
//! defer it, and MEDIUM/LOW/INFO queue up per `(user, severity)` and flush on
//! a severity-specific interval or when the queue hits its size limit.
//!
//! Queues live in the key-value store under `batch_state:{user_id}:{severity}`
//! so pending digests survive restarts. A per-key async mutex serializes
//! enqueue and flush for the same queue.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{NotificationRouter, payload_builder::AlertContent};
use crate::{
    config::BatcherConfig,
    engine::quiet_hours::QuietHoursManager,
    models::{
        BatchState, ChannelKind, DeliveryStatus, Detection, NewNotificationLog, Severity, User,
    },
    persistence::traits::{AppRepository, KeyValueStore},
};

const STATE_KEY_PREFIX: &str = "batch_state:";

/// Batches low-severity detections into digests and sends urgent ones
/// straight through the router.
pub struct NotificationBatcher<R: AppRepository, K: KeyValueStore> {
    repository: Arc<R>,
    store: Arc<K>,
    router: Arc<NotificationRouter<R>>,
    config: BatcherConfig,
    batch_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<R: AppRepository, K: KeyValueStore> NotificationBatcher<R, K> {
    pub fn new(
        repository: Arc<R>,
        store: Arc<K>,
        router: Arc<NotificationRouter<R>>,
        config: BatcherConfig,
    ) -> Self {
        Self { repository, store, router, config, batch_locks: DashMap::new() }
    }

    fn state_key(user_id: i64, severity: Severity) -> String {
        format!("{STATE_KEY_PREFIX}{user_id}:{severity}")
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.batch_locks.entry(key.to_string()).or_default().clone()
    }

    /// Accepts a new detection. Urgent severities route immediately; the
    /// rest are queued for the next digest. Errors are logged, never
    /// propagated, so a batching problem cannot stall the pipeline.
    pub async fn add_detection(&self, detection: &Detection, user: &User) {
        let severity = detection.severity;
        let now = Utc::now();

        if severity == Severity::Critical {
            self.router.route_detection(detection, user).await;
            tracing::info!(user_id = user.id, "Sent CRITICAL detection immediately.");
            return;
        }

        if severity == Severity::High {
            if QuietHoursManager::should_send_now(user, severity, now) {
                self.router.route_detection(detection, user).await;
                tracing::info!(user_id = user.id, "Sent HIGH detection immediately.");
            } else {
                // Quiet hours without the HIGH override: defer until the
                // window ends.
                let due_at = QuietHoursManager::next_send_time(user, now);
                self.enqueue(detection, user, due_at).await;
            }
            return;
        }

        let interval = self.config.interval_for(severity);
        let due_at = now + ChronoDuration::seconds(interval.as_secs() as i64);
        self.enqueue(detection, user, due_at).await;
    }

    /// Appends a detection to its `(user, severity)` queue, creating the
    /// queue when absent. A queue at its size limit flushes immediately.
    async fn enqueue(&self, detection: &Detection, user: &User, due_at: DateTime<Utc>) {
        let severity = detection.severity;
        let key = Self::state_key(user.id, severity);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let mut state = match self.store.get_json_state::<BatchState>(&key).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                BatchState { detections: Vec::new(), window_start_time: Utc::now(), due_at }
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to read batch state.");
                return;
            }
        };

        state.detections.push(detection.clone());
        tracing::info!(
            user_id = user.id,
            severity = %severity,
            queue_size = state.detections.len(),
            "Added detection to batch queue."
        );

        if state.detections.len() >= self.config.max_size_for(severity) {
            tracing::info!(key = %key, "Batch size limit reached, sending now.");
            self.flush_state(&key, &state, user).await;
            return;
        }

        if let Err(e) = self.store.set_json_state(&key, &state).await {
            tracing::error!(key = %key, error = %e, "Failed to persist batch state.");
        }
    }

    /// Background loop. Wakes on the configured interval and flushes every
    /// queue whose scheduled send time has passed.
    pub async fn run(&self) {
        tracing::info!("Batch processor started.");
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.flush_due().await;
        }
    }

    /// Flushes all queues whose `due_at` has passed.
    pub async fn flush_due(&self) {
        let states = match self.store.get_all_json_states_by_prefix::<BatchState>(STATE_KEY_PREFIX).await
        {
            Ok(states) => states,
            Err(e) => {
                tracing::error!(error = %e, "Failed to scan batch states.");
                return;
            }
        };

        let now = Utc::now();
        for (key, state) in states {
            if state.due_at <= now {
                self.flush_key(&key).await;
            }
        }
    }

    /// Flushes every pending queue regardless of schedule. Used on shutdown.
    pub async fn flush_all(&self) {
        let states = match self.store.get_all_json_states_by_prefix::<BatchState>(STATE_KEY_PREFIX).await
        {
            Ok(states) => states,
            Err(e) => {
                tracing::error!(error = %e, "Failed to scan batch states.");
                return;
            }
        };
        for (key, _) in states {
            self.flush_key(&key).await;
        }
    }

    /// Re-reads one queue under its lock and flushes it.
    async fn flush_key(&self, key: &str) {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let state = match self.store.get_json_state::<BatchState>(key).await {
            Ok(Some(state)) => state,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to read batch state.");
                return;
            }
        };

        let Some(user_id) = parse_user_id(key) else {
            tracing::error!(key = %key, "Malformed batch state key, discarding.");
            self.delete_state(key).await;
            return;
        };

        let user = match self.repository.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::error!(user_id, "User not found for batch send, discarding queue.");
                self.delete_state(key).await;
                return;
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load user for batch send.");
                return;
            }
        };

        self.flush_state(key, &state, &user).await;
    }

    /// Sends the digest for an in-hand queue and clears it. The caller holds
    /// the queue lock.
    async fn flush_state(&self, key: &str, state: &BatchState, user: &User) {
        if state.detections.is_empty() {
            self.delete_state(key).await;
            return;
        }

        let severity = state.detections[0].severity;
        let content = digest_content(severity, &state.detections);

        // Digests go to Telegram only; urgent alerts never reach this path.
        if user.telegram_verified {
            if let Some(chat_id) = &user.telegram_chat_id {
                match self.router.send_telegram(chat_id, &content).await {
                    Ok(()) => {
                        for detection in &state.detections {
                            self.log_batch_delivery(detection, user, chat_id).await;
                        }
                        tracing::info!(
                            user_id = user.id,
                            severity = %severity,
                            count = state.detections.len(),
                            "Sent batch notification."
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            user_id = user.id,
                            error = %e,
                            "Failed to send batch notification."
                        );
                    }
                }
            }
        }

        self.delete_state(key).await;
    }

    async fn delete_state(&self, key: &str) {
        if let Err(e) = self.store.delete_json_state(key).await {
            tracing::error!(key = %key, error = %e, "Failed to delete batch state.");
        }
    }

    async fn log_batch_delivery(&self, detection: &Detection, user: &User, chat_id: &str) {
        let log = NewNotificationLog {
            user_id: user.id,
            incident_id: None,
            detection_id: Some(detection.id),
            routing_rule_id: None,
            channel: ChannelKind::Telegram,
            destination: chat_id.to_string(),
            severity: Some(detection.severity),
            status: DeliveryStatus::Sent,
            delivered_at: Some(Utc::now()),
            error_message: None,
            retry_count: 0,
        };
        if let Err(e) = self.repository.insert_notification_log(&log).await {
            tracing::error!(user_id = user.id, error = %e, "Failed to log batch delivery.");
        }
    }
}

fn parse_user_id(key: &str) -> Option<i64> {
    key.strip_prefix(STATE_KEY_PREFIX)?.split(':').next()?.parse().ok()
}

/// Builds the digest message body: count header, time range, average anomaly
/// score and the top three categories.
fn digest_content(severity: Severity, detections: &[Detection]) -> AlertContent {
    let count = detections.len();
    let avg_anomaly =
        detections.iter().map(|d| d.anomaly_score).sum::<f64>() / count.max(1) as f64;

    let mut categories: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for detection in detections {
        *categories.entry(detection.primary_category.as_str()).or_insert(0) += 1;
    }
    let mut top: Vec<(&str, usize)> = categories.into_iter().collect();
    // Count descending, name ascending for a stable digest.
    top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    top.truncate(3);

    let category_lines: Vec<String> =
        top.iter().map(|(category, count)| format!("  \u{2022} {category}: {count}")).collect();

    let body = format!(
        "Time Range: {}\nAverage Anomaly: {:.2}\n\nTop Categories:\n{}",
        time_range(detections),
        avg_anomaly,
        category_lines.join("\n"),
    );

    AlertContent::digest(severity, count, body)
}

/// Human-readable span covered by the batched detections.
fn time_range(detections: &[Detection]) -> String {
    let times: Vec<DateTime<Utc>> = detections.iter().map(|d| d.created_at).collect();
    let (Some(earliest), Some(latest)) = (times.iter().min(), times.iter().max()) else {
        return "Unknown".to_string();
    };

    let diff = (*latest - *earliest).num_seconds();
    if diff < 3600 {
        format!("Last {} minutes", diff / 60)
    } else if diff < 86400 {
        format!("Last {} hours", diff / 3600)
    } else {
        format!("Last {} days", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::types::Json;

    use super::*;
    use crate::{
        config::{NotificationsConfig, TelegramConfig},
        http_client::HttpClientPool,
        models::{NotificationLog, Scope},
        persistence::traits::{MockAppRepository, MockKeyValueStore},
    };

    fn telegram_user() -> User {
        User {
            id: 1,
            alert_id: "alert-1".to_string(),
            email: None,
            email_verified: false,
            discord_webhook_url: None,
            discord_verified: false,
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

    fn detection(id: i64, severity: Severity, category: &str, anomaly: f64) -> Detection {
        Detection {
            id,
            normalized_event_id: id,
            user_id: 1,
            anomaly_score: anomaly,
            confidence: 0.8,
            severity,
            primary_category: category.to_string(),
            sub_categories: Json(vec![]),
            scope: Scope::Network,
            summary: "summary".to_string(),
            detailed_analysis: None,
            detected_patterns: Json(vec![]),
            risk_factors: Json(vec![]),
            recommendations: Json(vec![]),
            related_addresses: Json(vec![]),
            model_version: None,
            created_at: Utc::now(),
        }
    }

    fn echo_log(log: &NewNotificationLog) -> NotificationLog {
        NotificationLog {
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
        }
    }

    fn batcher_with(
        repo: MockAppRepository,
        store: MockKeyValueStore,
        api_base: String,
    ) -> NotificationBatcher<MockAppRepository, MockKeyValueStore> {
        let repo = Arc::new(repo);
        let config = NotificationsConfig {
            telegram: TelegramConfig { bot_token: "token".to_string(), api_base },
            ..Default::default()
        };
        let router = Arc::new(NotificationRouter::new(
            repo.clone(),
            Arc::new(HttpClientPool::new()),
            config.clone(),
        ));
        NotificationBatcher::new(repo, Arc::new(store), router, config.batcher)
    }

    #[tokio::test]
    async fn test_critical_detection_bypasses_batching() {
        let mut server = mockito::Server::new_async().await;
        let telegram_mock = server
            .mock("POST", "/bottoken/sendMessage")
            .with_status(200)
            .create_async()
            .await;

        let mut repo = MockAppRepository::new();
        repo.expect_get_matching_routing_rules().returning(|_, _| Ok(vec![]));
        repo.expect_insert_notification_log().returning(|log| Ok(echo_log(log)));

        let mut store = MockKeyValueStore::new();
        store.expect_set_json_state::<BatchState>().never();

        let batcher = batcher_with(repo, store, server.url());
        batcher.add_detection(&detection(1, Severity::Critical, "WhaleActivity", 0.9), &telegram_user()).await;

        telegram_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_medium_detection_is_queued() {
        let mut store = MockKeyValueStore::new();
        store.expect_get_json_state::<BatchState>().returning(|_| Ok(None));
        store
            .expect_set_json_state::<BatchState>()
            .withf(|key, state| {
                key == "batch_state:1:MEDIUM" && state.detections.len() == 1
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let batcher = batcher_with(
            MockAppRepository::new(),
            store,
            "http://unused.invalid".to_string(),
        );
        batcher.add_detection(&detection(1, Severity::Medium, "WhaleActivity", 0.5), &telegram_user()).await;
    }

    #[tokio::test]
    async fn test_tenth_medium_detection_forces_flush() {
        let mut server = mockito::Server::new_async().await;
        let telegram_mock = server
            .mock("POST", "/bottoken/sendMessage")
            .match_body(mockito::Matcher::Regex("10 MEDIUM ALERTS".to_string()))
            .with_status(200)
            .create_async()
            .await;

        let mut store = MockKeyValueStore::new();
        store.expect_get_json_state::<BatchState>().returning(|_| {
            let detections =
                (1..=9).map(|i| detection(i, Severity::Medium, "WhaleActivity", 0.5)).collect();
            Ok(Some(BatchState {
                detections,
                window_start_time: Utc::now(),
                due_at: Utc::now() + ChronoDuration::seconds(300),
            }))
        });
        store.expect_set_json_state::<BatchState>().never();
        store.expect_delete_json_state().times(1).returning(|_| Ok(()));

        let mut repo = MockAppRepository::new();
        repo.expect_insert_notification_log().times(10).returning(|log| Ok(echo_log(log)));

        let batcher = batcher_with(repo, store, server.url());
        batcher.add_detection(&detection(10, Severity::Medium, "WhaleActivity", 0.5), &telegram_user()).await;

        telegram_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_flush_due_sends_only_due_batches() {
        let mut server = mockito::Server::new_async().await;
        let telegram_mock = server
            .mock("POST", "/bottoken/sendMessage")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let due_state = BatchState {
            detections: vec![
                detection(1, Severity::Low, "NetworkHealth", 0.3),
                detection(2, Severity::Low, "WhaleActivity", 0.5),
            ],
            window_start_time: Utc::now() - ChronoDuration::seconds(1800),
            due_at: Utc::now() - ChronoDuration::seconds(5),
        };
        let pending_state = BatchState {
            detections: vec![detection(3, Severity::Info, "NetworkHealth", 0.2)],
            window_start_time: Utc::now(),
            due_at: Utc::now() + ChronoDuration::seconds(3600),
        };

        let mut store = MockKeyValueStore::new();
        {
            let due_state = due_state.clone();
            store.expect_get_all_json_states_by_prefix::<BatchState>().returning(move |_| {
                Ok(vec![
                    ("batch_state:1:LOW".to_string(), due_state.clone()),
                    ("batch_state:1:INFO".to_string(), pending_state.clone()),
                ])
            });
        }
        store
            .expect_get_json_state::<BatchState>()
            .withf(|key| key == "batch_state:1:LOW")
            .returning(move |_| Ok(Some(due_state.clone())));
        store.expect_delete_json_state().times(1).returning(|_| Ok(()));

        let mut repo = MockAppRepository::new();
        repo.expect_get_user().returning(|_| Ok(Some(telegram_user())));
        repo.expect_insert_notification_log().times(2).returning(|log| Ok(echo_log(log)));

        let batcher = batcher_with(repo, store, server.url());
        batcher.flush_due().await;

        telegram_mock.assert_async().await;
    }

    #[test]
    fn test_digest_content_format() {
        let detections = vec![
            detection(1, Severity::Medium, "WhaleActivity", 0.4),
            detection(2, Severity::Medium, "WhaleActivity", 0.6),
            detection(3, Severity::Medium, "NetworkHealth", 0.5),
        ];
        let content = digest_content(Severity::Medium, &detections);

        assert!(content.title.contains("3 MEDIUM ALERTS (Batched)"));
        assert!(content.body.contains("Average Anomaly: 0.50"));
        assert!(content.body.contains("\u{2022} WhaleActivity: 2"));
        assert!(content.body.contains("\u{2022} NetworkHealth: 1"));
    }

    #[test]
    fn test_time_range_buckets() {
        let now = Utc::now();
        let mut recent = detection(1, Severity::Low, "A", 0.1);
        recent.created_at = now;
        let mut older = detection(2, Severity::Low, "A", 0.1);
        older.created_at = now - ChronoDuration::seconds(600);
        assert_eq!(time_range(&[recent.clone(), older]), "Last 10 minutes");

        let mut much_older = detection(3, Severity::Low, "A", 0.1);
        much_older.created_at = now - ChronoDuration::seconds(7200);
        assert_eq!(time_range(&[recent.clone(), much_older]), "Last 2 hours");

        let mut ancient = detection(4, Severity::Low, "A", 0.1);
        ancient.created_at = now - ChronoDuration::seconds(200_000);
        assert_eq!(time_range(&[recent, ancient]), "Last 2 days");
    }
}
