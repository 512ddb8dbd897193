//! PostgreSQL administration and monitoring engine.
//!
//! Embeddable building blocks for administering one PostgreSQL server:
//! a bounded connection pool, a retrying SQL executor, idempotent
//! database/role/privilege operations, bulk ingestion, and a background
//! metrics monitor with threshold alerts.
//!
//! [`session::AdminSession`] wires the layers together; each layer is
//! also usable on its own.

pub mod executor;
pub mod monitor;
pub mod ops;
pub mod pool;
pub mod session;

pub use executor::{SqlExecutor, SqlValue};
pub use monitor::{MetricsCollector, MonitorScheduler};
pub use ops::AdminOps;
pub use pool::AdminPool;
pub use session::AdminSession;
