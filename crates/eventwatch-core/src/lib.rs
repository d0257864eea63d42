//! eventwatch-core — shared domain types and configuration.
//!
//! Everything the other eventwatch crates agree on lives here: the
//! enumerated lifecycle status of an eventing function, the persisted
//! status record, the transient alert event, the `eventwatch.toml`
//! configuration model, and the pass schedule.

pub mod config;
pub mod schedule;
pub mod types;

pub use config::{AlertTransport, ConfigError, WatcherConfig, parse_duration};
pub use schedule::Schedule;
pub use types::*;
