//! eventwatch-stats — read-only view of the eventing service.
//!
//! [`StatsSource`] is the seam the reconciler talks to; [`EventingClient`]
//! implements it over HTTP. Every call suspends until the response is
//! decoded and fails with a [`StatsError`]; nothing is retried here.

pub mod client;
pub mod error;
pub mod types;

pub use client::{EventingClient, StatsSource};
pub use error::StatsError;
pub use types::*;
