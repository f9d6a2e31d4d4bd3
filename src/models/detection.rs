//! AI detection results attached to normalized events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use super::{Scope, Severity};

/// The result of running the external analysis model over a normalized
/// event. At most one detection exists per event; immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Detection {
    #[sqlx(rename = "detection_id")]
    pub id: i64,
    pub normalized_event_id: i64,
    pub user_id: i64,
    /// Anomaly score in `[0, 1]`.
    pub anomaly_score: f64,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    pub severity: Severity,
    pub primary_category: String,
    pub sub_categories: Json<Vec<String>>,
    pub scope: Scope,
    pub summary: String,
    pub detailed_analysis: Option<String>,
    pub detected_patterns: Json<Vec<String>>,
    pub risk_factors: Json<Vec<String>>,
    pub recommendations: Json<Vec<String>>,
    pub related_addresses: Json<Vec<String>>,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw analysis returned by the external model (or the degraded default when
/// the model is unavailable), before classification enriches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionAnalysis {
    pub anomaly_score: f64,
    pub confidence: f64,
    pub severity: Severity,
    pub primary_category: String,
    pub scope: Scope,
    pub summary: String,
    #[serde(default)]
    pub detailed_analysis: Option<String>,
    #[serde(default)]
    pub detected_patterns: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub related_addresses: Vec<String>,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl DetectionAnalysis {
    /// Safe default used when the analysis model fails or is disabled:
    /// MEDIUM severity at low confidence, so nothing noisy gets escalated.
    pub fn degraded(summary: impl Into<String>) -> Self {
        Self {
            anomaly_score: 0.5,
            confidence: 0.3,
            severity: Severity::Medium,
            primary_category: "UnusualPattern".to_string(),
            scope: Scope::Network,
            summary: summary.into(),
            detailed_analysis: None,
            detected_patterns: Vec::new(),
            risk_factors: Vec::new(),
            recommendations: Vec::new(),
            related_addresses: Vec::new(),
            model_version: None,
        }
    }
}

/// Insert form of [`Detection`].
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub normalized_event_id: i64,
    pub user_id: i64,
    pub analysis: DetectionAnalysis,
    /// Sub-categories assigned by the classification engine.
    pub sub_categories: Vec<String>,
}
