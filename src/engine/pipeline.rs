//! # Event Pipeline
//!
//! End-to-end processing for one inbound webhook event: resolve the owning
//! user, store the raw payload, normalize it, run the rule engine, run the
//! analysis/classification path and hand results to the notification layer.
//!
//! Containment boundaries are deliberate. A normalization failure marks the
//! raw event `failed` and stops. Failures past normalization in the analysis
//! path degrade or skip that path without failing the request; the raw and
//! normalized events are already durable at that point.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::{
    detection::DetectionAnalyzer,
    engine::{classification::ClassificationEngine, rule_engine::RuleEngine},
    models::{
        DetectionAnalysis, EventStatus, NewDetection, NewEvent, NewIncident, NormalizedEvent, User,
    },
    normalizer::{EventNormalizer, NormalizeError},
    notification::{NotificationRouter, batcher::NotificationBatcher},
    persistence::{
        error::PersistenceError,
        traits::{AppRepository, KeyValueStore},
    },
};

/// Errors that fail webhook processing outright.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The payload carries no `alert_id`, so no user can be resolved.
    #[error("Payload is missing the alert_id field")]
    MissingAlertId,

    /// No user owns the given alert id.
    #[error("Unknown alert id: {0}")]
    UnknownAlertId(String),

    /// The stored raw event could not be normalized.
    #[error("Failed to normalize event {event_id}: {source}")]
    NormalizationFailed {
        event_id: i64,
        #[source]
        source: NormalizeError,
    },

    /// A storage operation failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// What a successfully processed webhook produced.
#[derive(Debug, Serialize)]
pub struct PipelineOutcome {
    pub event_id: i64,
    pub normalized_event_id: i64,
    pub incidents_created: usize,
}

/// Drives one event through ingestion, detection and notification.
pub struct EventPipeline<R: AppRepository, K: KeyValueStore> {
    repository: Arc<R>,
    rule_engine: RuleEngine<R>,
    analyzer: Option<Arc<dyn DetectionAnalyzer>>,
    router: Arc<NotificationRouter<R>>,
    batcher: Arc<NotificationBatcher<R, K>>,
}

impl<R: AppRepository, K: KeyValueStore> EventPipeline<R, K> {
    pub fn new(
        repository: Arc<R>,
        rule_engine: RuleEngine<R>,
        analyzer: Option<Arc<dyn DetectionAnalyzer>>,
        router: Arc<NotificationRouter<R>>,
        batcher: Arc<NotificationBatcher<R, K>>,
    ) -> Self {
        Self { repository, rule_engine, analyzer, router, batcher }
    }

    /// Processes one verified webhook payload.
    pub async fn process_webhook_event(
        &self,
        payload: serde_json::Value,
        signature: Option<String>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let alert_id = payload
            .get("alert_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(PipelineError::MissingAlertId)?
            .to_string();

        let user = self
            .repository
            .find_user_by_alert_id(&alert_id)
            .await?
            .ok_or_else(|| PipelineError::UnknownAlertId(alert_id.clone()))?;

        let event = self
            .repository
            .insert_event(&NewEvent {
                user_id: user.id,
                source: format!("easyconnect:{alert_id}"),
                payload,
                signature,
            })
            .await?;
        tracing::info!(event_id = event.id, user_id = user.id, "Event stored.");

        let mut new_normalized = match EventNormalizer::normalize(&event.payload.0) {
            Ok(normalized) => normalized,
            Err(e) => {
                self.repository.update_event_status(event.id, EventStatus::Failed).await?;
                return Err(PipelineError::NormalizationFailed { event_id: event.id, source: e });
            }
        };
        new_normalized.event_id = Some(event.id);

        let normalized = self.repository.insert_normalized_event(&new_normalized).await?;
        self.repository.update_event_status(event.id, EventStatus::Parsed).await?;
        tracing::info!(
            event_id = event.id,
            normalized_event_id = normalized.id,
            event_name = %normalized.event_name,
            "Event normalized."
        );

        let incidents = self.rule_engine.evaluate_event(&user, &normalized).await?;
        if !incidents.is_empty() {
            tracing::info!(count = incidents.len(), "Incidents created by rules.");
        }
        for incident in &incidents {
            self.router.route_incident(incident, &user).await;
        }

        let mut incidents_created = incidents.len();
        incidents_created += self.run_analysis(&user, &normalized).await;

        Ok(PipelineOutcome {
            event_id: event.id,
            normalized_event_id: normalized.id,
            incidents_created,
        })
    }

    /// Runs the analysis/classification path. Returns how many incidents it
    /// created. All failures here are contained; the event is already stored.
    async fn run_analysis(&self, user: &User, normalized: &NormalizedEvent) -> usize {
        let Some(analyzer) = &self.analyzer else {
            return 0;
        };

        let analysis = match analyzer.analyze(normalized).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(
                    normalized_event_id = normalized.id,
                    error = %e,
                    "Analysis failed, using degraded defaults."
                );
                DetectionAnalysis::degraded(format!(
                    "Automated analysis unavailable for {} event",
                    normalized.event_name
                ))
            }
        };

        let classification = ClassificationEngine::classify(&analysis, normalized);

        let detection = match self
            .repository
            .insert_detection(&NewDetection {
                normalized_event_id: normalized.id,
                user_id: user.id,
                analysis: analysis.clone(),
                sub_categories: classification.sub_categories.clone(),
            })
            .await
        {
            Ok(detection) => detection,
            Err(PersistenceError::AlreadyExists(_)) => {
                tracing::debug!(
                    normalized_event_id = normalized.id,
                    "Detection already exists, skipping analysis path."
                );
                return 0;
            }
            Err(e) => {
                tracing::error!(
                    normalized_event_id = normalized.id,
                    error = %e,
                    "Failed to store detection."
                );
                return 0;
            }
        };
        tracing::info!(
            detection_id = detection.id,
            severity = %detection.severity,
            anomaly_score = detection.anomaly_score,
            category = %detection.primary_category,
            "Analysis complete."
        );

        let mut created = 0;
        if ClassificationEngine::should_create_incident(&analysis) {
            match self
                .repository
                .insert_incident(&NewIncident {
                    user_id: user.id,
                    severity: analysis.severity,
                    kind: analysis.primary_category.clone(),
                    scope: Some(analysis.scope),
                    title: truncate(&analysis.summary, 255),
                    description: analysis.detailed_analysis.clone(),
                    protocol: normalized.contract_label.clone(),
                    contract_address: normalized.contract_address.clone(),
                    primary_wallet: normalized.from_address.clone(),
                    first_seen_at: normalized.timestamp,
                    last_seen_at: normalized.timestamp,
                    rule_id: None,
                    detection_id: Some(detection.id),
                    deduplication_key: None,
                    tags: classification.tags.clone(),
                    metadata: serde_json::json!({
                        "anomaly_score": analysis.anomaly_score,
                        "confidence": analysis.confidence,
                        "risk_level": classification.risk_level,
                        "priority": classification.priority,
                    }),
                })
                .await
            {
                Ok(incident) => {
                    if let Err(e) =
                        self.repository.link_incident_event(incident.id, normalized.id).await
                    {
                        tracing::error!(
                            incident_id = incident.id,
                            error = %e,
                            "Failed to link incident to event."
                        );
                    }
                    tracing::info!(
                        incident_id = incident.id,
                        severity = %incident.severity,
                        "Incident created from detection."
                    );
                    created = 1;
                }
                Err(e) => {
                    tracing::error!(
                        detection_id = detection.id,
                        error = %e,
                        "Failed to create incident from detection."
                    );
                }
            }
        }

        // The batcher decides between immediate delivery and digests.
        self.batcher.add_detection(&detection, user).await;

        created
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
