//! Bounded connection pool for one target.
//!
//! Wraps `sqlx::PgPool` with the engine's settings: min/max size, acquire
//! timeout, and per-connection server parameters (statement timeout and
//! TCP keepalives) applied at physical connection creation so a stuck
//! administrative query cannot hold the pool hostage.

use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Postgres;

use common::config::PoolSettings;
use common::errors::{AppError, AppResult};
use common::models::ConnectionTarget;

/// Point-in-time pool bookkeeping.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Connections currently open (in use + idle).
    pub size: u32,
    /// Idle connections waiting in the pool.
    pub idle: u32,
    /// Configured maximum.
    pub max_size: u32,
}

/// Connection pool bound to one [`ConnectionTarget`].
///
/// Cheap to clone; clones share the same underlying pool. Safe for
/// concurrent acquire/release from the foreground operation path and the
/// background monitoring task simultaneously.
#[derive(Clone)]
pub struct AdminPool {
    inner: PgPool,
    max_size: u32,
}

impl AdminPool {
    /// Opens a pool against the target.
    ///
    /// Establishes one connection eagerly, so an unreachable host or
    /// rejected credentials fail here rather than on first use. That
    /// failure is fatal to the caller and is not retried internally.
    pub async fn connect(target: &ConnectionTarget, settings: &PoolSettings) -> AppResult<Self> {
        let options = connect_options(target, settings)?;

        let inner = PgPoolOptions::new()
            .min_connections(settings.min_connections)
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            // Broken connections are discarded on checkout, never handed
            // out as healthy.
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(AppError::from)?;

        tracing::info!(
            target = %target.label(),
            min = settings.min_connections,
            max = settings.max_connections,
            "connection pool created"
        );

        Ok(Self {
            inner,
            max_size: settings.max_connections,
        })
    }

    /// Checks out a connection, waiting up to the configured acquire
    /// timeout. A saturated pool yields [`AppError::PoolExhausted`] rather
    /// than growing past its maximum.
    pub async fn acquire(&self) -> AppResult<PoolConnection<Postgres>> {
        self.inner.acquire().await.map_err(AppError::from)
    }

    /// The underlying sqlx pool, for executor-level query building.
    pub fn inner(&self) -> &PgPool {
        &self.inner
    }

    /// Closes every connection. The pool is unusable afterward; construct
    /// a new one to reconnect.
    pub async fn close_all(&self) {
        self.inner.close().await;
        tracing::info!("connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.inner.size(),
            idle: self.inner.num_idle() as u32,
            max_size: self.max_size,
        }
    }
}

/// Builds per-connection options for the target.
///
/// The statement timeout and keepalive settings ride along as server-side
/// session parameters so every physical connection gets them at creation
/// time.
fn connect_options(target: &ConnectionTarget, settings: &PoolSettings) -> AppResult<PgConnectOptions> {
    let mut options = PgConnectOptions::new()
        .host(&target.host)
        .port(target.port)
        .application_name("admin-engine")
        .options([
            ("statement_timeout", settings.statement_timeout_ms.to_string()),
            (
                "tcp_keepalives_idle",
                settings.keepalives_idle_secs.to_string(),
            ),
            ("tcp_keepalives_interval", "10".to_string()),
            ("tcp_keepalives_count", "5".to_string()),
        ]);

    if let Some(username) = &target.username {
        options = options.username(username);
    }
    if let Some(password) = &target.password {
        options = options.password(password);
    }
    if let Some(database) = &target.database {
        options = options.database(database);
    }
    if let Some(mode) = &target.ssl_mode {
        let mode: PgSslMode = mode
            .parse()
            .map_err(|_| AppError::Configuration(format!("unknown sslmode '{mode}'")))?;
        options = options.ssl_mode(mode);
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_options_rejects_unknown_sslmode() {
        let target =
            ConnectionTarget::parse("postgresql://admin@localhost/appdb?sslmode=bogus").unwrap();
        assert!(connect_options(&target, &PoolSettings::default()).is_err());
    }

    #[test]
    fn connect_options_accepts_standard_sslmodes() {
        for mode in ["disable", "prefer", "require", "verify-ca", "verify-full"] {
            let url = format!("postgresql://admin@localhost/appdb?sslmode={mode}");
            let target = ConnectionTarget::parse(&url).unwrap();
            assert!(
                connect_options(&target, &PoolSettings::default()).is_ok(),
                "{mode}"
            );
        }
    }
}
