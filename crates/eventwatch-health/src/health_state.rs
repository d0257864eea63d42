//! Overall watcher health, published by the reconciler.
//!
//! The reconciler owns the `watch::Sender`; everything else reads through
//! a [`HealthHandle`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthState {
    /// `false` only after a pass failed to enumerate functions.
    pub healthy: bool,
    /// Start time of the last pass that ran to completion.
    pub last_pass_at: Option<DateTime<Utc>>,
    /// Start time of the last pass attempt, successful or not.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Enumeration error of the last attempt, if it failed.
    pub last_error: Option<String>,
    /// Functions seen by the last completed pass.
    pub function_count: usize,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: true,
            last_pass_at: None,
            last_attempt_at: None,
            last_error: None,
            function_count: 0,
        }
    }
}

/// Read-only view of the watcher's health.
#[derive(Clone)]
pub struct HealthHandle {
    rx: watch::Receiver<HealthState>,
}

impl HealthHandle {
    pub(crate) fn new(rx: watch::Receiver<HealthState>) -> Self {
        Self { rx }
    }

    /// A handle pinned to a fixed state, for callers without a reconciler.
    pub fn fixed(state: HealthState) -> Self {
        let (_tx, rx) = watch::channel(state);
        Self { rx }
    }

    pub fn is_healthy(&self) -> bool {
        self.rx.borrow().healthy
    }

    pub fn snapshot(&self) -> HealthState {
        self.rx.borrow().clone()
    }

    /// Wait until the state changes. Returns `false` once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
