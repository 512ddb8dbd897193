//! Session façade.
//!
//! An [`AdminSession`] owns the whole stack for one target: pool,
//! executor, operations, and the monitoring scheduler. Construction is
//! fail-fast (a bad target errors here, not on first use); shutdown stops
//! the monitor before closing the pool so no cycle is cut off mid-query.

use std::sync::Arc;

use common::config::AppConfig;
use common::errors::AppResult;
use common::models::ConnectionTarget;

use crate::executor::SqlExecutor;
use crate::monitor::{MetricsCollector, MonitorScheduler};
use crate::ops::AdminOps;
use crate::pool::{AdminPool, PoolStats};

/// One administrative session against one server.
pub struct AdminSession {
    target: ConnectionTarget,
    pool: AdminPool,
    ops: AdminOps,
    scheduler: MonitorScheduler,
}

impl AdminSession {
    /// Connects to the target and wires up the full stack. The monitor is
    /// constructed but not started; call [`start_monitoring`] when wanted.
    ///
    /// [`start_monitoring`]: Self::start_monitoring
    pub async fn connect(target: ConnectionTarget, config: AppConfig) -> AppResult<Self> {
        let pool = AdminPool::connect(&target, &config.pool).await?;
        let executor = Arc::new(SqlExecutor::new(pool.clone(), config.executor.clone()));
        let collector = Arc::new(MetricsCollector::new(
            pool.clone(),
            config.thresholds.clone(),
        ));
        let scheduler = MonitorScheduler::new(
            collector,
            config.monitor.clone(),
            config.thresholds.clone(),
        );
        let ops = AdminOps::new(executor, config);

        tracing::info!(target = %target.label(), "session established");
        Ok(Self {
            target,
            pool,
            ops,
            scheduler,
        })
    }

    /// The target this session is bound to (password redacted on display).
    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Administrative operations: database/role lifecycle, privileges,
    /// bulk ingestion.
    pub fn ops(&self) -> &AdminOps {
        &self.ops
    }

    /// The background monitor, for history and alert access.
    pub fn monitor(&self) -> &MonitorScheduler {
        &self.scheduler
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Starts the background monitoring loop. Idempotent.
    pub async fn start_monitoring(&self) {
        self.scheduler.start().await;
    }

    /// Stops the background monitoring loop. Idempotent.
    pub async fn stop_monitoring(&self) {
        self.scheduler.stop().await;
    }

    /// Shuts the session down: monitor first, then the pool. The session
    /// is unusable afterward.
    pub async fn close(&self) {
        self.scheduler.stop().await;
        self.pool.close_all().await;
        tracing::info!(target = %self.target.label(), "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
