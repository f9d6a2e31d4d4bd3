//! The external AI analysis collaborator, abstracted behind a trait so the
//! pipeline never depends on a concrete model client.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::models::{DetectionAnalysis, NormalizedEvent};

/// Errors surfaced by an analyzer implementation.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The model call failed or timed out.
    #[error("Analysis request failed: {0}")]
    RequestFailed(String),

    /// The model returned something that could not be interpreted.
    #[error("Analysis response invalid: {0}")]
    InvalidResponse(String),
}

/// Produces an analysis for a normalized event. Implementations call an
/// external model; the pipeline degrades to
/// [`DetectionAnalysis::degraded`](crate::models::DetectionAnalysis::degraded)
/// when a call fails, so errors here never halt event processing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DetectionAnalyzer: Send + Sync {
    async fn analyze(&self, event: &NormalizedEvent) -> Result<DetectionAnalysis, AnalyzerError>;
}
