//! Severity and scope classifications shared across the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a detection, rule or incident, ordered from least to most
/// severe so that comparisons like `severity >= Severity::High` work.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// The canonical uppercase name, as used in API payloads and state keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Base notification priority for this severity (1..=10).
    pub fn base_priority(&self) -> u8 {
        match self {
            Severity::Critical => 10,
            Severity::High => 7,
            Severity::Medium => 5,
            Severity::Low => 3,
            Severity::Info => 1,
        }
    }

    /// Emoji used as a visual severity marker in notification messages.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Critical => "\u{1F534}",
            Severity::High => "\u{1F7E0}",
            Severity::Medium => "\u{1F535}",
            Severity::Low => "\u{1F7E2}",
            Severity::Info => "\u{26AA}",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blast radius of a detection: the whole network, a protocol/contract, or a
/// single wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Scope {
    Network,
    Protocol,
    Wallet,
}

impl Scope {
    /// The canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Network => "network",
            Scope::Protocol => "protocol",
            Scope::Wallet => "wallet",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_severity_serde_uppercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let parsed: Severity = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }

    #[test]
    fn test_base_priority_table() {
        assert_eq!(Severity::Critical.base_priority(), 10);
        assert_eq!(Severity::Info.base_priority(), 1);
    }
}
