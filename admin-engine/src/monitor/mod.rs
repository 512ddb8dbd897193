//! Server monitoring: metrics collection, alert evaluation, and the
//! background scheduler that ties them together.

pub mod collector;
pub mod evaluator;
pub mod scheduler;

pub use collector::{Collect, MetricsCollector};
pub use evaluator::evaluate;
pub use scheduler::MonitorScheduler;
