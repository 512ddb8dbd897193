//! Engine configuration.
//!
//! The embedding application (or the external registry collaborator) builds
//! one [`AppConfig`] at startup and hands it to the engine. The snapshot is
//! read-only thereafter; nothing re-initializes configuration mid-flight.

use serde::Deserialize;

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Minimum number of pooled connections kept open.
    pub min_connections: u32,
    /// Maximum number of concurrently checked-out connections.
    pub max_connections: u32,
    /// How long an `acquire` may wait on a saturated pool, in seconds.
    pub acquire_timeout_secs: u64,
    /// Server-side statement timeout applied to every physical connection,
    /// in milliseconds. A stuck administrative query cannot hold a
    /// connection past this bound.
    pub statement_timeout_ms: u64,
    /// TCP keepalive idle time pushed to the server, in seconds.
    pub keepalives_idle_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout_secs: 10,
            statement_timeout_ms: 30_000,
            keepalives_idle_secs: 30,
        }
    }
}

/// SQL executor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Attempts for transient connection-level failures.
    pub retry_attempts: u32,
    /// Linear backoff step between attempts, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Statements slower than this are logged, in milliseconds.
    pub slow_statement_ms: u64,
    /// Default batch size for bulk inserts.
    pub batch_size: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff_ms: 500,
            slow_statement_ms: 500,
            batch_size: 1000,
        }
    }
}

/// Monitoring scheduler settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Seconds between collection cycles.
    pub interval_secs: u64,
    /// Maximum retained metrics snapshots (oldest evicted).
    pub history_limit: usize,
    /// Maximum retained alerts (oldest evicted).
    pub alert_limit: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            history_limit: 10_000,
            alert_limit: 100,
        }
    }
}

/// Alert thresholds evaluated against every metrics snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Total server connections above this raise a warning.
    pub max_connections: i64,
    /// Cache-hit ratio (percent) below this raises a warning.
    pub min_cache_hit_ratio: f64,
    /// Active queries running longer than this are reported, in seconds.
    pub slow_query_secs: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_connections: 80,
            min_cache_hit_ratio: 95.0,
            slow_query_secs: 5.0,
        }
    }
}

/// Password complexity policy for generated and caller-supplied passwords.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Minimum password length.
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 16,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

/// Immutable engine configuration snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pool: PoolSettings,
    pub executor: ExecutorSettings,
    pub monitor: MonitorSettings,
    pub thresholds: AlertThresholds,
    pub password: PasswordPolicy,
}

impl AppConfig {
    /// Loads the default configuration with environment overrides.
    ///
    /// Recognized variables: `PG_POOL_MIN`, `PG_POOL_MAX`,
    /// `PG_ACQUIRE_TIMEOUT_SECS`, `PG_STATEMENT_TIMEOUT_MS`,
    /// `MONITOR_INTERVAL_SECS`, `SLOW_STATEMENT_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("PG_POOL_MIN") {
            config.pool.min_connections = v;
        }
        if let Some(v) = env_parse("PG_POOL_MAX") {
            config.pool.max_connections = v;
        }
        if let Some(v) = env_parse("PG_ACQUIRE_TIMEOUT_SECS") {
            config.pool.acquire_timeout_secs = v;
        }
        if let Some(v) = env_parse("PG_STATEMENT_TIMEOUT_MS") {
            config.pool.statement_timeout_ms = v;
        }
        if let Some(v) = env_parse("MONITOR_INTERVAL_SECS") {
            config.monitor.interval_secs = v;
        }
        if let Some(v) = env_parse("SLOW_STATEMENT_MS") {
            config.executor.slow_statement_ms = v;
        }
        tracing::debug!(?config, "configuration loaded");
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert!(config.pool.min_connections <= config.pool.max_connections);
        assert_eq!(config.executor.retry_attempts, 3);
        assert_eq!(config.monitor.alert_limit, 100);
        assert_eq!(config.password.min_length, 16);
    }

    #[test]
    fn partial_json_document_takes_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"pool": {"max_connections": 50}}"#).unwrap();
        assert_eq!(config.pool.max_connections, 50);
        assert_eq!(config.pool.min_connections, 1);
        assert_eq!(config.thresholds.max_connections, 80);
    }
}
