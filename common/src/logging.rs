//! Logging bootstrap.
//!
//! Called exactly once at process start by the embedding application. The
//! engine itself only emits `tracing` events and never installs a
//! subscriber on its own.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the tracing subscriber with an env-filter.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies
/// (e.g. `"info"` or `"admin_engine=debug,info"`).
pub fn init(default_filter: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
