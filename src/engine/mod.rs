//! Detection engines: rule evaluation, AI-result classification, quiet hours
//! and the end-to-end ingestion pipeline.

pub mod classification;
pub mod pipeline;
pub mod quiet_hours;
pub mod rule_engine;
