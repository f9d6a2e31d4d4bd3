//! SQLite implementation of `AppRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use crate::{
    models::{
        Detection, Event, EventStatus, Incident, IncidentFilter, IncidentUpdate, NewDetection,
        NewEvent, NewIncident, NewNormalizedEvent, NewNotificationLog, NewRoutingRule, NewRule,
        NewUser, NormalizedEvent, NotificationLog, RoutingRule, Rule, RuleUpdate, Severity, User,
    },
    persistence::{error::PersistenceError, sqlite::SqliteRepository, traits::AppRepository},
};

fn page_offset(page: u32, page_size: u32) -> i64 {
    let page = page.max(1);
    i64::from(page - 1) * i64::from(page_size)
}

#[async_trait]
impl AppRepository for SqliteRepository {
    async fn create_user(&self, user: &NewUser) -> Result<User, PersistenceError> {
        let now = Utc::now();
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                alert_id, email, email_verified, discord_webhook_url, discord_verified,
                telegram_chat_id, telegram_verified, quiet_hours_enabled, quiet_hours_start,
                quiet_hours_end, quiet_hours_timezone, quiet_hours_override_high,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&user.alert_id)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.discord_webhook_url)
        .bind(user.discord_verified)
        .bind(&user.telegram_chat_id)
        .bind(user.telegram_verified)
        .bind(user.quiet_hours_enabled)
        .bind(user.quiet_hours_start)
        .bind(user.quiet_hours_end)
        .bind(&user.quiet_hours_timezone)
        .bind(user.quiet_hours_override_high)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("create_user", e))
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, PersistenceError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SqliteRepository::map_db_error("get_user", e))
    }

    async fn find_user_by_alert_id(
        &self,
        alert_id: &str,
    ) -> Result<Option<User>, PersistenceError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE alert_id = ?")
            .bind(alert_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SqliteRepository::map_db_error("find_user_by_alert_id", e))
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<Event, PersistenceError> {
        let now = Utc::now();
        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (user_id, source, payload, signature, status, received_at, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            RETURNING *
            "#,
        )
        .bind(event.user_id)
        .bind(&event.source)
        .bind(Json(&event.payload))
        .bind(&event.signature)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("insert_event", e))
    }

    async fn update_event_status(
        &self,
        event_id: i64,
        status: EventStatus,
    ) -> Result<(), PersistenceError> {
        let result = sqlx::query("UPDATE events SET status = ? WHERE event_id = ?")
            .bind(status)
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(|e| SqliteRepository::map_db_error("update_event_status", e))?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("event {}", event_id)));
        }
        Ok(())
    }

    async fn insert_normalized_event(
        &self,
        event: &NewNormalizedEvent,
    ) -> Result<NormalizedEvent, PersistenceError> {
        sqlx::query_as::<_, NormalizedEvent>(
            r#"
            INSERT INTO normalized_events (
                event_id, chain, contract_address, contract_label, event_name, tx_hash,
                tx_status, from_address, to_address, amount, token_symbol, block_height,
                tick, timestamp, metadata, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(event.event_id)
        .bind(&event.chain)
        .bind(&event.contract_address)
        .bind(&event.contract_label)
        .bind(&event.event_name)
        .bind(&event.tx_hash)
        .bind(&event.tx_status)
        .bind(&event.from_address)
        .bind(&event.to_address)
        .bind(event.amount)
        .bind(&event.token_symbol)
        .bind(event.block_height)
        .bind(event.tick)
        .bind(event.timestamp)
        .bind(Json(&event.metadata))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("insert_normalized_event", e))
    }

    async fn count_similar_events<'a>(
        &self,
        event_name: &str,
        contract_address: Option<&'a str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, PersistenceError> {
        let count: (i64,) = match contract_address {
            Some(contract) => {
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*) FROM normalized_events
                    WHERE event_name = ? AND contract_address = ?
                      AND timestamp >= ? AND timestamp <= ?
                    "#,
                )
                .bind(event_name)
                .bind(contract)
                .bind(from)
                .bind(to)
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*) FROM normalized_events
                    WHERE event_name = ? AND timestamp >= ? AND timestamp <= ?
                    "#,
                )
                .bind(event_name)
                .bind(from)
                .bind(to)
                .fetch_one(&self.pool)
                .await
            }
        }
        .map_err(|e| SqliteRepository::map_db_error("count_similar_events", e))?;
        Ok(count.0)
    }

    async fn get_enabled_rules(&self, user_id: i64) -> Result<Vec<Rule>, PersistenceError> {
        sqlx::query_as::<_, Rule>(
            "SELECT * FROM rules WHERE user_id = ? AND enabled = TRUE ORDER BY rule_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("get_enabled_rules", e))
    }

    async fn create_rule(&self, user_id: i64, rule: &NewRule) -> Result<Rule, PersistenceError> {
        let now = Utc::now();
        sqlx::query_as::<_, Rule>(
            r#"
            INSERT INTO rules (
                user_id, name, description, severity, kind, scope, conditions,
                aggregation_window_seconds, aggregation_min_count, deduplication_key_template,
                cooldown_seconds, enabled, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.severity)
        .bind(&rule.kind)
        .bind(rule.scope)
        .bind(Json(&rule.conditions))
        .bind(rule.aggregation_window_seconds)
        .bind(rule.aggregation_min_count)
        .bind(&rule.deduplication_key_template)
        .bind(rule.cooldown_seconds)
        .bind(rule.enabled)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("create_rule", e))
    }

    async fn get_rule(
        &self,
        user_id: i64,
        rule_id: i64,
    ) -> Result<Option<Rule>, PersistenceError> {
        sqlx::query_as::<_, Rule>("SELECT * FROM rules WHERE user_id = ? AND rule_id = ?")
            .bind(user_id)
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SqliteRepository::map_db_error("get_rule", e))
    }

    async fn list_rules(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Rule>, i64), PersistenceError> {
        let rules = sqlx::query_as::<_, Rule>(
            "SELECT * FROM rules WHERE user_id = ? ORDER BY rule_id LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("list_rules", e))?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rules WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SqliteRepository::map_db_error("list_rules", e))?;

        Ok((rules, total.0))
    }

    async fn update_rule(
        &self,
        user_id: i64,
        rule_id: i64,
        update: &RuleUpdate,
    ) -> Result<Rule, PersistenceError> {
        let mut rule = self
            .get_rule(user_id, rule_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("rule {}", rule_id)))?;

        if let Some(name) = &update.name {
            rule.name = name.clone();
        }
        if let Some(description) = &update.description {
            rule.description = Some(description.clone());
        }
        if let Some(severity) = update.severity {
            rule.severity = severity;
        }
        if let Some(kind) = &update.kind {
            rule.kind = Some(kind.clone());
        }
        if let Some(scope) = update.scope {
            rule.scope = Some(scope);
        }
        if let Some(conditions) = &update.conditions {
            rule.conditions = Json(conditions.clone());
        }
        if let Some(window) = update.aggregation_window_seconds {
            rule.aggregation_window_seconds = Some(window);
        }
        if let Some(min_count) = update.aggregation_min_count {
            rule.aggregation_min_count = min_count;
        }
        if let Some(template) = &update.deduplication_key_template {
            rule.deduplication_key_template = Some(template.clone());
        }
        if let Some(cooldown) = update.cooldown_seconds {
            rule.cooldown_seconds = cooldown;
        }
        if let Some(enabled) = update.enabled {
            rule.enabled = enabled;
        }
        rule.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE rules SET
                name = ?, description = ?, severity = ?, kind = ?, scope = ?, conditions = ?,
                aggregation_window_seconds = ?, aggregation_min_count = ?,
                deduplication_key_template = ?, cooldown_seconds = ?, enabled = ?, updated_at = ?
            WHERE user_id = ? AND rule_id = ?
            "#,
        )
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.severity)
        .bind(&rule.kind)
        .bind(rule.scope)
        .bind(&rule.conditions)
        .bind(rule.aggregation_window_seconds)
        .bind(rule.aggregation_min_count)
        .bind(&rule.deduplication_key_template)
        .bind(rule.cooldown_seconds)
        .bind(rule.enabled)
        .bind(rule.updated_at)
        .bind(user_id)
        .bind(rule_id)
        .execute(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("update_rule", e))?;

        Ok(rule)
    }

    async fn disable_rule(&self, user_id: i64, rule_id: i64) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            "UPDATE rules SET enabled = FALSE, updated_at = ? WHERE user_id = ? AND rule_id = ?",
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(rule_id)
        .execute(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("disable_rule", e))?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("rule {}", rule_id)));
        }
        Ok(())
    }

    async fn insert_incident(
        &self,
        incident: &NewIncident,
    ) -> Result<Incident, PersistenceError> {
        let now = Utc::now();
        sqlx::query_as::<_, Incident>(
            r#"
            INSERT INTO incidents (
                user_id, severity, status, kind, scope, title, description, protocol,
                contract_address, primary_wallet, first_seen_at, last_seen_at, rule_id,
                detection_id, deduplication_key, tags, metadata, created_at, updated_at
            )
            VALUES (?, ?, 'open', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(incident.user_id)
        .bind(incident.severity)
        .bind(&incident.kind)
        .bind(incident.scope)
        .bind(&incident.title)
        .bind(&incident.description)
        .bind(&incident.protocol)
        .bind(&incident.contract_address)
        .bind(&incident.primary_wallet)
        .bind(incident.first_seen_at)
        .bind(incident.last_seen_at)
        .bind(incident.rule_id)
        .bind(incident.detection_id)
        .bind(&incident.deduplication_key)
        .bind(Json(&incident.tags))
        .bind(Json(&incident.metadata))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("insert_incident", e))
    }

    async fn link_incident_event(
        &self,
        incident_id: i64,
        normalized_event_id: i64,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO incident_events (incident_id, normalized_event_id, added_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(incident_id)
        .bind(normalized_event_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("link_incident_event", e))?;
        Ok(())
    }

    async fn dedup_key_seen_since(
        &self,
        key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM incidents WHERE deduplication_key = ? AND created_at >= ?",
        )
        .bind(key)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("dedup_key_seen_since", e))?;
        Ok(count.0 > 0)
    }

    async fn get_incident(
        &self,
        user_id: i64,
        incident_id: i64,
    ) -> Result<Option<Incident>, PersistenceError> {
        sqlx::query_as::<_, Incident>(
            "SELECT * FROM incidents WHERE user_id = ? AND incident_id = ?",
        )
        .bind(user_id)
        .bind(incident_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("get_incident", e))
    }

    async fn list_incidents(
        &self,
        user_id: i64,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Incident>, i64), PersistenceError> {
        let incidents = sqlx::query_as::<_, Incident>(
            r#"
            SELECT * FROM incidents
            WHERE user_id = ?
              AND (? IS NULL OR severity = ?)
              AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC, incident_id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(filter.severity)
        .bind(filter.severity)
        .bind(filter.status)
        .bind(filter.status)
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("list_incidents", e))?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM incidents
            WHERE user_id = ?
              AND (? IS NULL OR severity = ?)
              AND (? IS NULL OR status = ?)
            "#,
        )
        .bind(user_id)
        .bind(filter.severity)
        .bind(filter.severity)
        .bind(filter.status)
        .bind(filter.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("list_incidents", e))?;

        Ok((incidents, total.0))
    }

    async fn update_incident(
        &self,
        user_id: i64,
        incident_id: i64,
        update: &IncidentUpdate,
    ) -> Result<Incident, PersistenceError> {
        let mut incident = self
            .get_incident(user_id, incident_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("incident {}", incident_id)))?;

        if let Some(status) = update.status {
            incident.status = status;
        }
        if let Some(notes) = &update.user_notes {
            incident.user_notes = Some(notes.clone());
        }
        if let Some(assigned_to) = &update.assigned_to {
            incident.assigned_to = Some(assigned_to.clone());
        }
        incident.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE incidents SET status = ?, user_notes = ?, assigned_to = ?, updated_at = ?
            WHERE user_id = ? AND incident_id = ?
            "#,
        )
        .bind(incident.status)
        .bind(&incident.user_notes)
        .bind(&incident.assigned_to)
        .bind(incident.updated_at)
        .bind(user_id)
        .bind(incident_id)
        .execute(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("update_incident", e))?;

        Ok(incident)
    }

    async fn insert_detection(
        &self,
        detection: &NewDetection,
    ) -> Result<Detection, PersistenceError> {
        let analysis = &detection.analysis;
        sqlx::query_as::<_, Detection>(
            r#"
            INSERT INTO detections (
                normalized_event_id, user_id, anomaly_score, confidence, severity,
                primary_category, sub_categories, scope, summary, detailed_analysis,
                detected_patterns, risk_factors, recommendations, related_addresses,
                model_version, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(detection.normalized_event_id)
        .bind(detection.user_id)
        .bind(analysis.anomaly_score)
        .bind(analysis.confidence)
        .bind(analysis.severity)
        .bind(&analysis.primary_category)
        .bind(Json(&detection.sub_categories))
        .bind(analysis.scope)
        .bind(&analysis.summary)
        .bind(&analysis.detailed_analysis)
        .bind(Json(&analysis.detected_patterns))
        .bind(Json(&analysis.risk_factors))
        .bind(Json(&analysis.recommendations))
        .bind(Json(&analysis.related_addresses))
        .bind(&analysis.model_version)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("insert_detection", e))
    }

    async fn create_routing_rule(
        &self,
        user_id: i64,
        rule: &NewRoutingRule,
    ) -> Result<RoutingRule, PersistenceError> {
        let now = Utc::now();
        sqlx::query_as::<_, RoutingRule>(
            r#"
            INSERT INTO routing_rules (
                user_id, severity, incident_type, scope, discord_webhook_url,
                telegram_chat_id, email_enabled, webhook_url, webhook_secret,
                notification_format, priority, enabled, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(rule.severity)
        .bind(&rule.incident_type)
        .bind(rule.scope)
        .bind(&rule.discord_webhook_url)
        .bind(&rule.telegram_chat_id)
        .bind(rule.email_enabled)
        .bind(&rule.webhook_url)
        .bind(&rule.webhook_secret)
        .bind(rule.notification_format)
        .bind(rule.priority)
        .bind(rule.enabled)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("create_routing_rule", e))
    }

    async fn get_matching_routing_rules(
        &self,
        user_id: i64,
        severity: Severity,
    ) -> Result<Vec<RoutingRule>, PersistenceError> {
        sqlx::query_as::<_, RoutingRule>(
            r#"
            SELECT * FROM routing_rules
            WHERE user_id = ? AND severity = ? AND enabled = TRUE
            ORDER BY priority DESC, routing_rule_id
            "#,
        )
        .bind(user_id)
        .bind(severity)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("get_matching_routing_rules", e))
    }

    async fn get_routing_rule(
        &self,
        user_id: i64,
        routing_rule_id: i64,
    ) -> Result<Option<RoutingRule>, PersistenceError> {
        sqlx::query_as::<_, RoutingRule>(
            "SELECT * FROM routing_rules WHERE user_id = ? AND routing_rule_id = ?",
        )
        .bind(user_id)
        .bind(routing_rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("get_routing_rule", e))
    }

    async fn list_routing_rules(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<RoutingRule>, i64), PersistenceError> {
        let rules = sqlx::query_as::<_, RoutingRule>(
            "SELECT * FROM routing_rules WHERE user_id = ? ORDER BY routing_rule_id LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("list_routing_rules", e))?;

        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM routing_rules WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| SqliteRepository::map_db_error("list_routing_rules", e))?;

        Ok((rules, total.0))
    }

    async fn update_routing_rule(
        &self,
        user_id: i64,
        routing_rule_id: i64,
        rule: &NewRoutingRule,
    ) -> Result<RoutingRule, PersistenceError> {
        let updated = sqlx::query_as::<_, RoutingRule>(
            r#"
            UPDATE routing_rules SET
                severity = ?, incident_type = ?, scope = ?, discord_webhook_url = ?,
                telegram_chat_id = ?, email_enabled = ?, webhook_url = ?, webhook_secret = ?,
                notification_format = ?, priority = ?, enabled = ?, updated_at = ?
            WHERE user_id = ? AND routing_rule_id = ?
            RETURNING *
            "#,
        )
        .bind(rule.severity)
        .bind(&rule.incident_type)
        .bind(rule.scope)
        .bind(&rule.discord_webhook_url)
        .bind(&rule.telegram_chat_id)
        .bind(rule.email_enabled)
        .bind(&rule.webhook_url)
        .bind(&rule.webhook_secret)
        .bind(rule.notification_format)
        .bind(rule.priority)
        .bind(rule.enabled)
        .bind(Utc::now())
        .bind(user_id)
        .bind(routing_rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("update_routing_rule", e))?;

        updated
            .ok_or_else(|| PersistenceError::NotFound(format!("routing rule {}", routing_rule_id)))
    }

    async fn delete_routing_rule(
        &self,
        user_id: i64,
        routing_rule_id: i64,
    ) -> Result<(), PersistenceError> {
        let result =
            sqlx::query("DELETE FROM routing_rules WHERE user_id = ? AND routing_rule_id = ?")
                .bind(user_id)
                .bind(routing_rule_id)
                .execute(&self.pool)
                .await
                .map_err(|e| SqliteRepository::map_db_error("delete_routing_rule", e))?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!(
                "routing rule {}",
                routing_rule_id
            )));
        }
        Ok(())
    }

    async fn insert_notification_log(
        &self,
        log: &NewNotificationLog,
    ) -> Result<NotificationLog, PersistenceError> {
        sqlx::query_as::<_, NotificationLog>(
            r#"
            INSERT INTO notification_logs (
                user_id, incident_id, detection_id, routing_rule_id, channel, destination,
                severity, status, delivered_at, error_message, retry_count, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(log.user_id)
        .bind(log.incident_id)
        .bind(log.detection_id)
        .bind(log.routing_rule_id)
        .bind(log.channel)
        .bind(&log.destination)
        .bind(log.severity)
        .bind(log.status)
        .bind(log.delivered_at)
        .bind(&log.error_message)
        .bind(log.retry_count)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("insert_notification_log", e))
    }

    async fn list_notification_logs(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<NotificationLog>, i64), PersistenceError> {
        let logs = sqlx::query_as::<_, NotificationLog>(
            r#"
            SELECT * FROM notification_logs
            WHERE user_id = ?
            ORDER BY created_at DESC, notification_log_id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SqliteRepository::map_db_error("list_notification_logs", e))?;

        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notification_logs WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| SqliteRepository::map_db_error("list_notification_logs", e))?;

        Ok((logs, total.0))
    }
}
