//! eventwatch-health — decides whether each eventing function is healthy
//! and records what changed.
//!
//! # Architecture
//!
//! ```text
//! run_scheduler (interval or cron, skips overlapping ticks)
//!   └── Reconciler::try_run_pass()
//!         ├── StatsSource::list_functions()   ← failure aborts the pass
//!         ├── per function, up to `concurrency` at once
//!         │   ├── fetch_stats() → evaluate() → Verdict
//!         │   ├── StatusStore::get_latest() / append_status()
//!         │   └── Notifier::send() for transitions and breaches
//!         ├── StatusStore::delete_not_in(live)
//!         └── publish HealthState on a watch channel
//! ```
//!
//! Per-function failures never abort a pass: a function whose stats cannot
//! be fetched is recorded with status `error`. Only a failed enumeration
//! marks the watcher unhealthy, and the next successful pass clears it.

pub mod evaluator;
pub mod health_state;
pub mod reconciler;
pub mod scheduler;

pub use evaluator::{Breach, BreachKind, OPERATING_NORMALLY, Thresholds, Verdict, evaluate};
pub use health_state::{HealthHandle, HealthState};
pub use reconciler::{CheckOutcome, FunctionReport, PassReport, Reconciler};
pub use scheduler::run_scheduler;
