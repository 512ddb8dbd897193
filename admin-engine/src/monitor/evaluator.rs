//! Alert rule evaluation.
//!
//! Rules are a fixed table of pure functions over a snapshot; adding a
//! rule means adding a row. Evaluation never touches the server.

use common::config::AlertThresholds;
use common::models::alert::{Alert, AlertSeverity};
use common::models::metrics::MetricsSnapshot;

/// A rule firing: what was observed, the threshold crossed, and the
/// human-readable message.
pub struct RuleHit {
    pub observed: f64,
    pub threshold: f64,
    pub message: String,
}

/// One alert rule. `check` returns `Some` when the rule fires.
pub struct AlertRule {
    pub category: &'static str,
    pub severity: AlertSeverity,
    pub check: fn(&MetricsSnapshot, &AlertThresholds) -> Option<RuleHit>,
}

static RULES: [AlertRule; 3] = [
    AlertRule {
        category: "connections",
        severity: AlertSeverity::Warning,
        check: check_connections,
    },
    AlertRule {
        category: "cache",
        severity: AlertSeverity::Warning,
        check: check_cache,
    },
    AlertRule {
        category: "slow_queries",
        severity: AlertSeverity::Warning,
        check: check_slow_queries,
    },
];

pub fn rules() -> &'static [AlertRule] {
    &RULES
}

/// Evaluates every rule against one snapshot. Rules whose section is
/// absent from the snapshot stay silent rather than firing on defaults.
pub fn evaluate(snapshot: &MetricsSnapshot, thresholds: &AlertThresholds) -> Vec<Alert> {
    RULES
        .iter()
        .filter_map(|rule| {
            (rule.check)(snapshot, thresholds).map(|hit| {
                Alert::new(
                    rule.severity,
                    rule.category,
                    hit.message,
                    hit.observed,
                    hit.threshold,
                )
            })
        })
        .collect()
}

fn check_connections(snapshot: &MetricsSnapshot, thresholds: &AlertThresholds) -> Option<RuleHit> {
    let total = snapshot.connections.total;
    (total > thresholds.max_connections).then(|| RuleHit {
        observed: total as f64,
        threshold: thresholds.max_connections as f64,
        message: format!(
            "connection count {total} exceeds threshold {}",
            thresholds.max_connections
        ),
    })
}

fn check_cache(snapshot: &MetricsSnapshot, thresholds: &AlertThresholds) -> Option<RuleHit> {
    let cache = snapshot.cache.as_ref()?;
    (cache.heap_hit_ratio < thresholds.min_cache_hit_ratio).then(|| RuleHit {
        observed: cache.heap_hit_ratio,
        threshold: thresholds.min_cache_hit_ratio,
        message: format!(
            "cache hit ratio {:.1}% below threshold {:.1}%",
            cache.heap_hit_ratio, thresholds.min_cache_hit_ratio
        ),
    })
}

fn check_slow_queries(snapshot: &MetricsSnapshot, thresholds: &AlertThresholds) -> Option<RuleHit> {
    if snapshot.slow_queries.is_empty() {
        return None;
    }
    let count = snapshot.slow_queries.len();
    let longest = snapshot
        .slow_queries
        .iter()
        .map(|q| q.duration_secs)
        .fold(0.0_f64, f64::max);
    // The rule fires on any slow query at all, so the threshold crossed
    // is a count of zero; the duration cutoff only shapes the message.
    Some(RuleHit {
        observed: count as f64,
        threshold: 0.0,
        message: format!(
            "{count} queries active beyond {:.0}s (longest {longest:.1}s)",
            thresholds.slow_query_secs
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::metrics::{CacheStats, SlowQuery};

    fn thresholds() -> AlertThresholds {
        AlertThresholds::default()
    }

    #[test]
    fn quiet_snapshot_raises_nothing() {
        let snapshot = MetricsSnapshot::empty();
        assert!(evaluate(&snapshot, &thresholds()).is_empty());
    }

    #[test]
    fn connection_pressure_raises_a_warning() {
        let mut snapshot = MetricsSnapshot::empty();
        snapshot.connections.total = 120;
        let alerts = evaluate(&snapshot, &thresholds());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].category, "connections");
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert_eq!(alerts[0].observed, 120.0);
        assert_eq!(alerts[0].threshold, 80.0);
    }

    #[test]
    fn missing_cache_section_stays_silent() {
        // A snapshot with the cache section omitted must not fire the
        // cache rule, even though 0.0 would be far below the threshold.
        let snapshot = MetricsSnapshot::empty();
        assert!(evaluate(&snapshot, &thresholds())
            .iter()
            .all(|a| a.category != "cache"));
    }

    #[test]
    fn low_cache_hit_ratio_raises_a_warning() {
        let mut snapshot = MetricsSnapshot::empty();
        snapshot.cache = Some(CacheStats {
            heap_hit_ratio: 82.5,
            index_hit_ratio: None,
        });
        let alerts = evaluate(&snapshot, &thresholds());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].category, "cache");
        assert!(alerts[0].message.contains("82.5%"));
    }

    #[test]
    fn slow_queries_raise_a_warning() {
        let mut snapshot = MetricsSnapshot::empty();
        snapshot.slow_queries.push(SlowQuery {
            pid: 4242,
            username: Some("app".into()),
            database: Some("appdb".into()),
            duration_secs: 17.3,
            query: "SELECT pg_sleep(60)".into(),
        });
        let alerts = evaluate(&snapshot, &thresholds());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].category, "slow_queries");
        // Observed and threshold are both query counts, not durations.
        assert_eq!(alerts[0].observed, 1.0);
        assert_eq!(alerts[0].threshold, 0.0);
        assert!(alerts[0].message.contains("17.3s"));
    }

    #[test]
    fn multiple_rules_fire_independently() {
        let mut snapshot = MetricsSnapshot::empty();
        snapshot.connections.total = 200;
        snapshot.cache = Some(CacheStats {
            heap_hit_ratio: 50.0,
            index_hit_ratio: None,
        });
        assert_eq!(evaluate(&snapshot, &thresholds()).len(), 2);
    }
}
