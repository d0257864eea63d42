//! Metrics collector — counters for passes and alerts, gauges per function.
//!
//! Counters are plain atomics; the per-function gauge map and the breach
//! counters sit behind async `RwLock`s since they are keyed by name.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use eventwatch_core::StatusCategory;

/// Latest observed values for one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionGauges {
    pub status: StatusCategory,
    /// `None` when the stats fetch failed this pass.
    pub backlog: Option<u64>,
    pub breaches: u32,
}

/// Point-in-time copy of every metric, used for exposition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub passes_total: u64,
    pub passes_skipped_total: u64,
    pub enumeration_failures_total: u64,
    pub check_errors_total: u64,
    pub store_errors_total: u64,
    pub transitions_total: u64,
    pub alert_failures_total: u64,
    pub last_pass_duration_ms: u64,
    pub breaches_total: BTreeMap<String, u64>,
    pub functions: BTreeMap<String, FunctionGauges>,
}

/// Watcher-wide metrics, shared as `Arc<WatcherMetrics>`.
#[derive(Default)]
pub struct WatcherMetrics {
    passes_total: AtomicU64,
    passes_skipped_total: AtomicU64,
    enumeration_failures_total: AtomicU64,
    check_errors_total: AtomicU64,
    store_errors_total: AtomicU64,
    transitions_total: AtomicU64,
    alert_failures_total: AtomicU64,
    last_pass_duration_ms: AtomicU64,
    breaches_total: RwLock<HashMap<String, u64>>,
    functions: RwLock<HashMap<String, FunctionGauges>>,
}

impl WatcherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pass that enumerated functions and ran to completion.
    pub fn record_pass(&self, duration: Duration) {
        self.passes_total.fetch_add(1, Ordering::Relaxed);
        self.last_pass_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// A scheduled tick that found a pass already running.
    pub fn record_pass_skipped(&self) {
        self.passes_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enumeration_failure(&self) {
        self.enumeration_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_check_error(&self) {
        self.check_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.transitions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_failure(&self) {
        self.alert_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one detected breach of the given kind.
    pub async fn record_breach(&self, kind: &str) {
        let mut breaches = self.breaches_total.write().await;
        *breaches.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// Update the gauges for one function.
    pub async fn observe_function(
        &self,
        function: &str,
        status: StatusCategory,
        backlog: Option<u64>,
        breaches: usize,
    ) {
        let mut functions = self.functions.write().await;
        functions.insert(
            function.to_string(),
            FunctionGauges {
                status,
                backlog,
                breaches: breaches as u32,
            },
        );
    }

    /// Drop gauges for functions that are no longer live.
    pub async fn retain_functions(&self, live: &HashSet<String>) {
        let mut functions = self.functions.write().await;
        let before = functions.len();
        functions.retain(|name, _| live.contains(name));
        let dropped = before - functions.len();
        if dropped > 0 {
            debug!(dropped, "metrics gauges dropped for removed functions");
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let breaches = self.breaches_total.read().await;
        let functions = self.functions.read().await;
        MetricsSnapshot {
            passes_total: self.passes_total.load(Ordering::Relaxed),
            passes_skipped_total: self.passes_skipped_total.load(Ordering::Relaxed),
            enumeration_failures_total: self.enumeration_failures_total.load(Ordering::Relaxed),
            check_errors_total: self.check_errors_total.load(Ordering::Relaxed),
            store_errors_total: self.store_errors_total.load(Ordering::Relaxed),
            transitions_total: self.transitions_total.load(Ordering::Relaxed),
            alert_failures_total: self.alert_failures_total.load(Ordering::Relaxed),
            last_pass_duration_ms: self.last_pass_duration_ms.load(Ordering::Relaxed),
            breaches_total: breaches.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            functions: functions.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn counters_accumulate() {
        let metrics = WatcherMetrics::new();
        metrics.record_pass(Duration::from_millis(120));
        metrics.record_pass(Duration::from_millis(80));
        metrics.record_pass_skipped();
        metrics.record_enumeration_failure();
        metrics.record_check_error();
        metrics.record_transition();
        metrics.record_alert_failure();

        let snap = metrics.snapshot().await;
        assert_eq!(snap.passes_total, 2);
        assert_eq!(snap.last_pass_duration_ms, 80);
        assert_eq!(snap.passes_skipped_total, 1);
        assert_eq!(snap.enumeration_failures_total, 1);
        assert_eq!(snap.check_errors_total, 1);
        assert_eq!(snap.transitions_total, 1);
        assert_eq!(snap.alert_failures_total, 1);
        assert_eq!(snap.store_errors_total, 0);
    }

    #[tokio::test]
    async fn breaches_counted_by_kind() {
        let metrics = WatcherMetrics::new();
        metrics.record_breach("backlog_exceeded").await;
        metrics.record_breach("backlog_exceeded").await;
        metrics.record_breach("timeouts").await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.breaches_total.get("backlog_exceeded"), Some(&2));
        assert_eq!(snap.breaches_total.get("timeouts"), Some(&1));
    }

    #[tokio::test]
    async fn gauges_replace_and_retain() {
        let metrics = WatcherMetrics::new();
        metrics
            .observe_function("f1", StatusCategory::Deployed, Some(10), 0)
            .await;
        metrics
            .observe_function("f1", StatusCategory::Deployed, Some(1500), 1)
            .await;
        metrics
            .observe_function("f2", StatusCategory::Error, None, 0)
            .await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.functions["f1"].backlog, Some(1500));
        assert_eq!(snap.functions["f1"].breaches, 1);

        metrics.retain_functions(&live(&["f1"])).await;
        let snap = metrics.snapshot().await;
        assert_eq!(snap.functions.len(), 1);
        assert!(snap.functions.contains_key("f1"));
    }
}
