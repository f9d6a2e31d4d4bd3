//! Multi-dimensional classification of AI detection results: sub-categories,
//! tags, risk level and notification priority.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{DetectionAnalysis, NormalizedEvent, Scope, Severity};

/// Overall risk level derived from severity, anomaly score and confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Extreme,
    High,
    Moderate,
    Low,
    Minimal,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Extreme => "extreme",
            RiskLevel::High => "high",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Low => "low",
            RiskLevel::Minimal => "minimal",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full classification of one detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub primary_category: String,
    pub sub_categories: Vec<String>,
    pub scope: Scope,
    pub tags: Vec<String>,
    pub risk_level: RiskLevel,
    pub priority: u8,
}

/// Stateless classifier applied to every stored detection.
pub struct ClassificationEngine;

impl ClassificationEngine {
    /// Classifies a detection against the event it was produced from.
    pub fn classify(analysis: &DetectionAnalysis, event: &NormalizedEvent) -> Classification {
        let classification = Classification {
            primary_category: analysis.primary_category.clone(),
            sub_categories: Self::sub_categories(analysis, event),
            scope: analysis.scope,
            tags: Self::tags(analysis, event),
            risk_level: Self::risk_level(analysis),
            priority: Self::priority(analysis),
        };
        tracing::debug!(?classification, "Classification complete.");
        classification
    }

    /// Amount, pattern and contract derived sub-categories.
    pub fn sub_categories(analysis: &DetectionAnalysis, event: &NormalizedEvent) -> Vec<String> {
        let mut sub_cats = BTreeSet::new();

        match event.amount {
            Some(amount) if amount > 10_000_000 => {
                sub_cats.insert("MegaWhale".to_string());
            }
            Some(amount) if amount > 1_000_000 => {
                sub_cats.insert("Whale".to_string());
            }
            _ => {}
        }

        for pattern in &analysis.detected_patterns {
            let pattern = pattern.to_lowercase();
            if pattern.contains("exchange") {
                sub_cats.insert("ExchangeRelated".to_string());
            }
            if pattern.contains("accumulation") {
                sub_cats.insert("Accumulation".to_string());
            }
            if pattern.contains("dump") || pattern.contains("sell") {
                sub_cats.insert("PotentialSellPressure".to_string());
            }
        }

        if event.contract_label.is_some() {
            sub_cats.insert("SmartContractInteraction".to_string());
        }

        sub_cats.into_iter().collect()
    }

    /// Descriptive tags, deduplicated and sorted.
    pub fn tags(analysis: &DetectionAnalysis, event: &NormalizedEvent) -> Vec<String> {
        let mut tags = BTreeSet::new();

        tags.insert(analysis.severity.as_str().to_lowercase());
        tags.insert(slugify(&analysis.primary_category));
        tags.insert(format!("scope_{}", analysis.scope));

        if analysis.anomaly_score >= 0.8 {
            tags.insert("highly_anomalous".to_string());
        } else if analysis.anomaly_score >= 0.5 {
            tags.insert("anomalous".to_string());
        }

        if analysis.confidence >= 0.8 {
            tags.insert("high_confidence".to_string());
        } else if analysis.confidence < 0.5 {
            tags.insert("low_confidence".to_string());
        }

        tags.insert(slugify(&event.event_name));

        if let Some(label) = &event.contract_label {
            tags.insert(format!("contract_{}", label.to_lowercase()));
        }

        for pattern in analysis.detected_patterns.iter().take(3) {
            tags.insert(slugify(pattern));
        }

        tags.into_iter().collect()
    }

    /// Risk matrix over severity, anomaly score and confidence.
    pub fn risk_level(analysis: &DetectionAnalysis) -> RiskLevel {
        if analysis.severity == Severity::Critical && analysis.anomaly_score >= 0.7 {
            return RiskLevel::Extreme;
        }
        if analysis.severity >= Severity::High && analysis.confidence >= 0.7 {
            return RiskLevel::High;
        }
        if analysis.severity == Severity::Medium || analysis.anomaly_score >= 0.6 {
            return RiskLevel::Moderate;
        }
        if analysis.severity == Severity::Low {
            return RiskLevel::Low;
        }
        RiskLevel::Minimal
    }

    /// Notification priority in `1..=10`: severity base, bumped for high
    /// anomaly scores, reduced for low confidence.
    pub fn priority(analysis: &DetectionAnalysis) -> u8 {
        let mut priority = i16::from(analysis.severity.base_priority());

        if analysis.anomaly_score >= 0.9 {
            priority += 2;
        } else if analysis.anomaly_score >= 0.7 {
            priority += 1;
        }

        if analysis.confidence < 0.5 {
            priority -= 2;
        }

        priority.clamp(1, 10) as u8
    }

    /// Whether this detection warrants an incident on its own.
    pub fn should_create_incident(analysis: &DetectionAnalysis) -> bool {
        if analysis.severity >= Severity::High {
            return true;
        }
        if analysis.severity == Severity::Medium && analysis.confidence >= 0.6 {
            return true;
        }
        if analysis.anomaly_score >= 0.7 && analysis.confidence >= 0.5 {
            return true;
        }
        false
    }
}

fn slugify(value: &str) -> String {
    value.to_lowercase().replace(' ', "_")
}
