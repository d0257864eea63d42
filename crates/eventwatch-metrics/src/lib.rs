//! eventwatch-metrics — observability for the watcher itself.
//!
//! # Architecture
//!
//! ```text
//! WatcherMetrics
//!   ├── record_*()          ← called by the reconciler during a pass
//!   ├── observe_function()  ← per-function gauges (status, backlog, breaches)
//!   ├── retain_functions()  ← drops gauges for removed functions
//!   └── snapshot() → MetricsSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{FunctionGauges, MetricsSnapshot, WatcherMetrics};
pub use prometheus::render_prometheus;
