//! Metrics collection.
//!
//! One collection cycle issues a fixed battery of catalog and statistics
//! queries on a single pooled connection. A failing or empty sub-query is
//! logged and its snapshot section omitted; only a connection-level
//! failure aborts the cycle as a whole.

use async_trait::async_trait;
use sqlx::{PgConnection, Row};

use common::config::AlertThresholds;
use common::errors::{AppError, AppResult};
use common::models::metrics::{
    BgwriterStats, CacheStats, ConnectionCounts, LockCount, MetricsSnapshot, ReplicationStats,
    SlowQuery,
};

use crate::pool::AdminPool;

/// Seam between the scheduler and the thing it polls. Lets the scheduler
/// be exercised without a live server.
#[async_trait]
pub trait Collect: Send + Sync {
    async fn collect(&self) -> AppResult<MetricsSnapshot>;
}

/// Collects [`MetricsSnapshot`]s from one target.
pub struct MetricsCollector {
    pool: AdminPool,
    thresholds: AlertThresholds,
}

impl MetricsCollector {
    pub fn new(pool: AdminPool, thresholds: AlertThresholds) -> Self {
        Self { pool, thresholds }
    }
}

#[async_trait]
impl Collect for MetricsCollector {
    async fn collect(&self) -> AppResult<MetricsSnapshot> {
        // All sections observe the same connection, so the battery sees a
        // consistent backend even while foreground operations run.
        let mut conn = self.pool.acquire().await?;
        let mut snapshot = MetricsSnapshot::empty();

        match connection_counts(&mut conn).await {
            Ok(counts) => snapshot.connections = counts,
            Err(err) => tolerate("connections", err)?,
        }
        match cache_stats(&mut conn).await {
            Ok(cache) => snapshot.cache = cache,
            Err(err) => tolerate("cache", err)?,
        }
        match index_usage(&mut conn).await {
            Ok(ratio) => snapshot.index_usage_ratio = ratio,
            Err(err) => tolerate("indexes", err)?,
        }
        match ungranted_locks(&mut conn).await {
            Ok(locks) => snapshot.locks = locks,
            Err(err) => tolerate("locks", err)?,
        }
        match replication_stats(&mut conn).await {
            Ok(replication) => snapshot.replication = replication,
            Err(err) => tolerate("replication", err)?,
        }
        match bgwriter_stats(&mut conn).await {
            Ok(bgwriter) => snapshot.bgwriter = Some(bgwriter),
            Err(err) => tolerate("bgwriter", err)?,
        }
        match slow_queries(&mut conn, self.thresholds.slow_query_secs).await {
            Ok(queries) => snapshot.slow_queries = queries,
            Err(err) => tolerate("slow_queries", err)?,
        }

        Ok(snapshot)
    }
}

/// Logs a failed section and keeps going, unless the failure is
/// connection-level, in which case the whole cycle fails.
fn tolerate(section: &str, err: AppError) -> AppResult<()> {
    if err.is_transient() {
        return Err(err);
    }
    tracing::warn!(section, error = %err, "metrics section failed, omitting");
    Ok(())
}

async fn connection_counts(conn: &mut PgConnection) -> AppResult<ConnectionCounts> {
    let row = sqlx::query(
        "SELECT count(*) AS total, \
                count(*) FILTER (WHERE state = 'active') AS active, \
                count(*) FILTER (WHERE state = 'idle') AS idle, \
                count(*) FILTER (WHERE state = 'idle in transaction') AS idle_in_transaction, \
                count(*) FILTER (WHERE wait_event IS NOT NULL) AS waiting \
         FROM pg_stat_activity",
    )
    .fetch_one(&mut *conn)
    .await?;

    Ok(ConnectionCounts {
        total: row.try_get("total")?,
        active: row.try_get("active")?,
        idle: row.try_get("idle")?,
        idle_in_transaction: row.try_get("idle_in_transaction")?,
        waiting: row.try_get("waiting")?,
    })
}

async fn cache_stats(conn: &mut PgConnection) -> AppResult<Option<CacheStats>> {
    let row = sqlx::query(
        "SELECT sum(heap_blks_hit)::float8 \
                    / nullif(sum(heap_blks_hit) + sum(heap_blks_read), 0)::float8 * 100 AS heap, \
                sum(idx_blks_hit)::float8 \
                    / nullif(sum(idx_blks_hit) + sum(idx_blks_read), 0)::float8 * 100 AS idx \
         FROM pg_statio_user_tables",
    )
    .fetch_one(&mut *conn)
    .await?;

    let heap: Option<f64> = row.try_get("heap")?;
    // No user tables touched yet: nothing to report, not an error.
    Ok(heap.map(|heap_hit_ratio| CacheStats {
        heap_hit_ratio,
        index_hit_ratio: row.try_get("idx").ok().flatten(),
    }))
}

async fn index_usage(conn: &mut PgConnection) -> AppResult<Option<f64>> {
    let row = sqlx::query(
        "SELECT sum(idx_scan)::float8 \
                    / nullif(sum(idx_scan) + sum(seq_scan), 0)::float8 * 100 AS ratio \
         FROM pg_stat_user_tables",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.try_get("ratio")?)
}

async fn ungranted_locks(conn: &mut PgConnection) -> AppResult<Vec<LockCount>> {
    let rows = sqlx::query(
        "SELECT mode, count(*) AS count \
         FROM pg_locks \
         WHERE granted = false \
         GROUP BY mode \
         ORDER BY count DESC",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(LockCount {
                mode: row.try_get("mode")?,
                count: row.try_get("count")?,
            })
        })
        .collect()
}

async fn replication_stats(conn: &mut PgConnection) -> AppResult<Option<ReplicationStats>> {
    let row = sqlx::query(
        "SELECT count(*) AS standby_count, \
                max(pg_wal_lsn_diff(pg_current_wal_lsn(), replay_lsn))::bigint AS max_lag \
         FROM pg_stat_replication",
    )
    .fetch_one(&mut *conn)
    .await?;

    let standby_count: i64 = row.try_get("standby_count")?;
    if standby_count == 0 {
        // No replication configured.
        return Ok(None);
    }
    Ok(Some(ReplicationStats {
        standby_count,
        max_lag_bytes: row.try_get("max_lag").ok().flatten(),
    }))
}

async fn bgwriter_stats(conn: &mut PgConnection) -> AppResult<BgwriterStats> {
    let row = sqlx::query(
        "SELECT buffers_clean, maxwritten_clean, buffers_alloc FROM pg_stat_bgwriter",
    )
    .fetch_one(&mut *conn)
    .await?;

    Ok(BgwriterStats {
        buffers_clean: row.try_get("buffers_clean")?,
        maxwritten_clean: row.try_get("maxwritten_clean")?,
        buffers_alloc: row.try_get("buffers_alloc")?,
    })
}

async fn slow_queries(conn: &mut PgConnection, threshold_secs: f64) -> AppResult<Vec<SlowQuery>> {
    let rows = sqlx::query(
        "SELECT pid, usename, datname, \
                EXTRACT(EPOCH FROM (now() - query_start))::float8 AS duration_secs, \
                left(query, 200) AS query \
         FROM pg_stat_activity \
         WHERE state = 'active' \
           AND pid <> pg_backend_pid() \
           AND query_start IS NOT NULL \
           AND now() - query_start > make_interval(secs => $1) \
         ORDER BY duration_secs DESC \
         LIMIT 20",
    )
    .bind(threshold_secs)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(SlowQuery {
                pid: row.try_get("pid")?,
                username: row.try_get("usename").ok().flatten(),
                database: row.try_get("datname").ok().flatten(),
                duration_secs: row.try_get("duration_secs")?,
                query: row.try_get("query").unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_failures_are_tolerated() {
        assert!(tolerate("cache", AppError::Statement("relation missing".into())).is_ok());
    }

    #[test]
    fn connection_failures_abort_the_cycle() {
        assert!(tolerate("cache", AppError::ConnectionFailure("broken pipe".into())).is_err());
    }
}
