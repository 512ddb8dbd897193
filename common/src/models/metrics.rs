//! Server metrics models.
//!
//! A [`MetricsSnapshot`] is one immutable point-in-time capture produced by
//! a collection cycle. Sections a server has nothing to report for (no
//! replication configured, no ungranted locks) are `None` or empty rather
//! than errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection counts by backend state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionCounts {
    pub total: i64,
    pub active: i64,
    pub idle: i64,
    pub idle_in_transaction: i64,
    /// Backends currently waiting on a wait event.
    pub waiting: i64,
}

/// Buffer cache hit ratios, in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Heap block reads satisfied from the buffer cache.
    pub heap_hit_ratio: f64,
    /// Index block reads satisfied from the buffer cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_hit_ratio: Option<f64>,
}

/// Ungranted lock count for one lock mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockCount {
    pub mode: String,
    pub count: i64,
}

/// Streaming replication state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationStats {
    pub standby_count: i64,
    /// Largest replay lag across standbys, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lag_bytes: Option<i64>,
}

/// Background writer counters from `pg_stat_bgwriter`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BgwriterStats {
    pub buffers_clean: i64,
    pub maxwritten_clean: i64,
    pub buffers_alloc: i64,
}

/// One query active beyond the slow-query threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQuery {
    pub pid: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub duration_secs: f64,
    /// Statement text, truncated by the collector.
    pub query: String,
}

/// One immutable point-in-time capture of server metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub connections: ConnectionCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    /// Index scans versus sequential scans, in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_usage_ratio: Option<f64>,
    /// Ungranted locks grouped by mode; empty when nothing is blocked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locks: Vec<LockCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication: Option<ReplicationStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgwriter: Option<BgwriterStats>,
    /// Queries active beyond the configured slow-query threshold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slow_queries: Vec<SlowQuery>,
}

impl MetricsSnapshot {
    /// An empty snapshot stamped now; the collector fills sections in.
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            connections: ConnectionCounts::default(),
            cache: None,
            index_usage_ratio: None,
            locks: Vec::new(),
            replication: None,
            bgwriter: None,
            slow_queries: Vec::new(),
        }
    }
}

/// One database as reported by the server catalog. Transient query result;
/// the engine never caches these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseOverview {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub size_bytes: i64,
    /// Live backend sessions on this database.
    pub connections: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// One role as reported by `pg_roles`. Transient query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleOverview {
    pub name: String,
    pub is_superuser: bool,
    pub can_create_db: bool,
    pub can_create_role: bool,
    pub can_login: bool,
    pub active_connections: i64,
}

/// One role with its membership, as reported by `pg_roles` joined with
/// `pg_auth_members`. Transient query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRoleOverview {
    pub name: String,
    pub is_superuser: bool,
    pub can_create_db: bool,
    pub can_create_role: bool,
    /// Whether members automatically inherit this role's privileges.
    pub inherits: bool,
    pub can_login: bool,
    /// Roles granted membership in this role.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

/// Effective database-level access of one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseAccess {
    pub database: String,
    pub can_connect: bool,
    pub can_create: bool,
    pub can_temp: bool,
}

/// Effective table-level access of one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableAccess {
    pub schema: String,
    pub table: String,
    pub can_select: bool,
    pub can_insert: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub can_truncate: bool,
    pub can_references: bool,
    pub can_trigger: bool,
}

/// Effective privileges of one role, resolved through the server's
/// `has_database_privilege` / `has_table_privilege` functions so grants
/// inherited via group roles are included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrivileges {
    pub role: String,
    pub databases: Vec<DatabaseAccess>,
    pub tables: Vec<TableAccess>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_sections_are_omitted_from_json() {
        let snapshot = MetricsSnapshot::empty();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("replication"));
        assert!(!json.contains("locks"));
        assert!(json.contains("connections"));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut snapshot = MetricsSnapshot::empty();
        snapshot.cache = Some(CacheStats {
            heap_hit_ratio: 99.2,
            index_hit_ratio: Some(98.7),
        });
        snapshot.locks.push(LockCount {
            mode: "AccessExclusiveLock".into(),
            count: 2,
        });
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.locks.len(), 1);
        assert!(back.cache.is_some());
    }
}
