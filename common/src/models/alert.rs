//! Alert model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
            AlertSeverity::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

/// One threshold crossing observed in a metrics snapshot.
///
/// Alerts are never mutated after creation; the scheduler keeps them in a
/// bounded ring, dropping the oldest past the configured limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    /// Rule category, e.g. `connections`, `cache`, `slow_queries`.
    pub category: String,
    pub message: String,
    /// The value observed in the snapshot.
    pub observed: f64,
    /// The threshold it crossed.
    pub threshold: f64,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        category: impl Into<String>,
        message: impl Into<String>,
        observed: f64,
        threshold: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            category: category.into(),
            message: message.into(),
            observed,
            threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_order_by_urgency() {
        assert!(AlertSeverity::Info < AlertSeverity::Warning);
        assert!(AlertSeverity::Warning < AlertSeverity::Critical);
        assert!(AlertSeverity::Critical < AlertSeverity::Emergency);
    }
}
