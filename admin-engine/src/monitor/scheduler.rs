//! Background monitoring loop.
//!
//! One tokio task per scheduler: collect a snapshot, evaluate the alert
//! rules, append both to bounded histories, sleep. Cancellation is
//! cooperative through a [`CancellationToken`]; `stop()` waits for the
//! in-flight cycle to finish before returning, so no cycle is ever torn
//! down mid-query.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use common::config::{AlertThresholds, MonitorSettings};
use common::models::alert::Alert;
use common::models::metrics::MetricsSnapshot;

use super::collector::Collect;
use super::evaluator;

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic monitoring scheduler over one collector.
pub struct MonitorScheduler {
    collector: Arc<dyn Collect>,
    settings: MonitorSettings,
    thresholds: AlertThresholds,
    history: Arc<RwLock<VecDeque<MetricsSnapshot>>>,
    alerts: Arc<RwLock<VecDeque<Alert>>>,
    running: Mutex<Option<Running>>,
}

impl MonitorScheduler {
    pub fn new(
        collector: Arc<dyn Collect>,
        settings: MonitorSettings,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            collector,
            settings,
            thresholds,
            history: Arc::new(RwLock::new(VecDeque::new())),
            alerts: Arc::new(RwLock::new(VecDeque::new())),
            running: Mutex::new(None),
        }
    }

    /// Starts the monitoring loop. Idempotent: calling while already
    /// running is a warning, not a second task.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::warn!("monitor already running");
            return;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.collector.clone(),
            self.settings.clone(),
            self.thresholds.clone(),
            self.history.clone(),
            self.alerts.clone(),
            token.clone(),
        ));
        *running = Some(Running { token, handle });
        tracing::info!(interval_secs = self.settings.interval_secs, "monitor started");
    }

    /// Stops the loop and waits for the in-flight cycle to finish.
    /// Idempotent: stopping a stopped scheduler is a no-op.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.token.cancel();
        if let Err(err) = running.handle.await {
            tracing::warn!(error = %err, "monitor task ended abnormally");
        }
        tracing::info!("monitor stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// All retained snapshots, oldest first.
    pub async fn history(&self) -> Vec<MetricsSnapshot> {
        self.history.read().await.iter().cloned().collect()
    }

    /// The most recent snapshot, if any cycle has succeeded yet.
    pub async fn latest(&self) -> Option<MetricsSnapshot> {
        self.history.read().await.back().cloned()
    }

    /// All retained alerts, oldest first.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.iter().cloned().collect()
    }
}

async fn run_loop(
    collector: Arc<dyn Collect>,
    settings: MonitorSettings,
    thresholds: AlertThresholds,
    history: Arc<RwLock<VecDeque<MetricsSnapshot>>>,
    alerts: Arc<RwLock<VecDeque<Alert>>>,
    token: CancellationToken,
) {
    loop {
        match collector.collect().await {
            Ok(snapshot) => {
                let raised = evaluator::evaluate(&snapshot, &thresholds);
                for alert in &raised {
                    tracing::warn!(
                        severity = %alert.severity,
                        category = %alert.category,
                        observed = alert.observed,
                        threshold = alert.threshold,
                        "{}", alert.message
                    );
                }
                push_bounded(&mut *history.write().await, snapshot, settings.history_limit);
                let mut ring = alerts.write().await;
                for alert in raised {
                    push_bounded(&mut ring, alert, settings.alert_limit);
                }
            }
            // A failed cycle never kills the loop; the next tick retries.
            Err(err) => tracing::warn!(error = %err, "collection cycle failed"),
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(settings.interval_secs)) => {}
        }
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, limit: usize) {
    while ring.len() >= limit.max(1) {
        ring.pop_front();
    }
    ring.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::errors::{AppError, AppResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails its first `fail_first` cycles, then succeeds with a snapshot
    /// carrying the given connection total.
    struct StubCollector {
        calls: AtomicUsize,
        fail_first: usize,
        total_connections: i64,
    }

    #[async_trait]
    impl Collect for StubCollector {
        async fn collect(&self) -> AppResult<MetricsSnapshot> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(AppError::ConnectionFailure("server unreachable".into()));
            }
            let mut snapshot = MetricsSnapshot::empty();
            snapshot.connections.total = self.total_connections;
            Ok(snapshot)
        }
    }

    fn fast_settings() -> MonitorSettings {
        MonitorSettings {
            interval_secs: 0,
            history_limit: 8,
            alert_limit: 5,
        }
    }

    #[tokio::test]
    async fn loop_survives_failed_cycles() {
        let collector = Arc::new(StubCollector {
            calls: AtomicUsize::new(0),
            fail_first: 3,
            total_connections: 1,
        });
        let scheduler = MonitorScheduler::new(
            collector.clone(),
            fast_settings(),
            AlertThresholds::default(),
        );

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        assert!(collector.calls.load(Ordering::SeqCst) > 3);
        assert!(scheduler.latest().await.is_some());
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let collector = Arc::new(StubCollector {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            total_connections: 1,
        });
        let scheduler =
            MonitorScheduler::new(collector, fast_settings(), AlertThresholds::default());

        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn histories_stay_bounded() {
        let collector = Arc::new(StubCollector {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            // Above the default threshold, so every cycle raises an alert.
            total_connections: 500,
        });
        let scheduler =
            MonitorScheduler::new(collector, fast_settings(), AlertThresholds::default());

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        let history = scheduler.history().await;
        let alerts = scheduler.alerts().await;
        assert!(!history.is_empty());
        assert!(history.len() <= 8);
        assert!(!alerts.is_empty());
        assert!(alerts.len() <= 5);
        assert!(alerts.iter().all(|a| a.category == "connections"));
    }

    #[tokio::test]
    async fn stop_waits_for_inflight_cycle() {
        let collector = Arc::new(StubCollector {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            total_connections: 1,
        });
        let scheduler = MonitorScheduler::new(
            collector.clone(),
            MonitorSettings {
                interval_secs: 3600,
                ..fast_settings()
            },
            AlertThresholds::default(),
        );

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.stop().await;

        // Exactly one cycle ran before the long sleep was cancelled.
        assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.history().await.len(), 1);
    }
}
