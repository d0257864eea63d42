//! Status reconciler — one pass over every live function.
//!
//! For each function the reconciler fetches stats, evaluates them, reads
//! the previous record, appends the new record, and alerts on status
//! transitions and on breaches. Functions are processed concurrently up to
//! a fixed cap; stale rows are deleted only after every function is done.
//!
//! # Alerting
//!
//! ```text
//! transition (previous record exists and status differs)
//!   → error | paused             warning
//!   → deployed from error|paused info, "recovered"
//!   → anything else              info
//!
//! breach (every pass, one alert per kind)
//!   redeploy_required  warning
//!   backlog_exceeded   error
//!   execution_failures warning
//!   timeouts           warning
//! ```

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use eventwatch_core::{AlertEvent, Severity, StatusCategory, StatusRecord};
use eventwatch_metrics::WatcherMetrics;
use eventwatch_notify::Notifier;
use eventwatch_state::StatusStore;
use eventwatch_stats::{StatsError, StatsSource};

use crate::evaluator::{Breach, BreachKind, Thresholds, Verdict, evaluate};
use crate::health_state::{HealthHandle, HealthState};

const DEFAULT_CONCURRENCY: usize = 8;

/// What happened to one function during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionReport {
    pub function: String,
    /// Status of the latest record before this pass, if one existed.
    pub previous: Option<StatusCategory>,
    pub status: StatusCategory,
    pub message: String,
    pub breaches: Vec<BreachKind>,
    pub transition: bool,
    /// Whether the new record was written.
    pub persisted: bool,
    /// Fetch or store error encountered for this function.
    pub error: Option<String>,
    /// Alerts emitted for this function, in send order.
    pub alerts: Vec<AlertEvent>,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// `false` when the function list could not be fetched.
    pub completed: bool,
    /// Sorted by function name.
    pub functions: Vec<FunctionReport>,
    /// Rows removed for functions no longer live.
    pub removed_records: u64,
    /// Process-level alerts (not tied to one function).
    pub alerts: Vec<AlertEvent>,
    /// Pass-level error: enumeration or bulk delete failure.
    pub error: Option<String>,
}

impl PassReport {
    /// Every alert emitted during the pass.
    pub fn all_alerts(&self) -> impl Iterator<Item = &AlertEvent> {
        self.alerts
            .iter()
            .chain(self.functions.iter().flat_map(|f| f.alerts.iter()))
    }

    pub fn transitions(&self) -> usize {
        self.functions.iter().filter(|f| f.transition).count()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionReport> {
        self.functions.iter().find(|f| f.function == name)
    }
}

/// Result of an on-demand single-function check.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// A pass or another check is in flight.
    Busy,
    /// The function is not in the live list.
    UnknownFunction,
    Checked(FunctionReport),
}

/// Drives reconciliation passes. Share as `Arc<Reconciler>`.
pub struct Reconciler {
    stats: Arc<dyn StatsSource>,
    store: Arc<dyn StatusStore>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<WatcherMetrics>,
    thresholds: Thresholds,
    concurrency: usize,
    health_tx: watch::Sender<HealthState>,
    /// Held for the duration of a pass or on-demand check.
    pass_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        stats: Arc<dyn StatsSource>,
        store: Arc<dyn StatusStore>,
        notifier: Arc<dyn Notifier>,
        thresholds: Thresholds,
    ) -> Self {
        let (health_tx, _) = watch::channel(HealthState::default());
        Self {
            stats,
            store,
            notifier,
            metrics: Arc::new(WatcherMetrics::new()),
            thresholds,
            concurrency: DEFAULT_CONCURRENCY,
            health_tx,
            pass_lock: Mutex::new(()),
        }
    }

    /// Share an externally owned metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<WatcherMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Cap the number of functions processed at once (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn health(&self) -> HealthHandle {
        HealthHandle::new(self.health_tx.subscribe())
    }

    pub fn metrics(&self) -> Arc<WatcherMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run a pass, waiting for any in-flight pass to finish first.
    pub async fn run_pass(&self) -> PassReport {
        let _guard = self.pass_lock.lock().await;
        self.run_pass_locked().await
    }

    /// Run a pass unless one is already in flight.
    pub async fn try_run_pass(&self) -> Option<PassReport> {
        let _guard = self.pass_lock.try_lock().ok()?;
        Some(self.run_pass_locked().await)
    }

    /// Reconcile a single live function now. Does not delete stale rows.
    pub async fn check_function(&self, name: &str) -> Result<CheckOutcome, StatsError> {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            return Ok(CheckOutcome::Busy);
        };
        let live = self.stats.list_functions().await?;
        if !live.iter().any(|n| n == name) {
            return Ok(CheckOutcome::UnknownFunction);
        }
        Ok(CheckOutcome::Checked(
            self.reconcile_function(name.to_string()).await,
        ))
    }

    async fn run_pass_locked(&self) -> PassReport {
        let started = Instant::now();
        let started_at = Utc::now();

        let live: BTreeSet<String> = match self.stats.list_functions().await {
            Ok(names) => names.into_iter().collect(),
            Err(e) => return self.abort_pass(started, started_at, e).await,
        };
        debug!(functions = live.len(), "reconciliation pass started");

        let mut functions: Vec<FunctionReport> = futures::stream::iter(live.iter().cloned())
            .map(|name| self.reconcile_function(name))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        functions.sort_by(|a, b| a.function.cmp(&b.function));

        // Every per-function write is done; only now is it safe to prune.
        let keep: HashSet<String> = live.iter().cloned().collect();
        let (removed_records, error) = match self.store.delete_not_in(&keep) {
            Ok(removed) => (removed, None),
            Err(e) => {
                error!(error = %e, "failed to delete status rows for removed functions");
                self.metrics.record_store_error();
                (0, Some(format!("failed to delete stale status rows: {e}")))
            }
        };
        self.metrics.retain_functions(&keep).await;

        let duration = started.elapsed();
        self.metrics.record_pass(duration);
        self.health_tx.send_modify(|h| {
            h.healthy = true;
            h.last_pass_at = Some(started_at);
            h.last_attempt_at = Some(started_at);
            h.last_error = None;
            h.function_count = live.len();
        });

        let report = PassReport {
            started_at,
            duration_ms: duration.as_millis() as u64,
            completed: true,
            functions,
            removed_records,
            alerts: Vec::new(),
            error,
        };
        info!(
            functions = report.functions.len(),
            transitions = report.transitions(),
            alerts = report.all_alerts().count(),
            removed = removed_records,
            duration_ms = report.duration_ms,
            "reconciliation pass completed"
        );
        report
    }

    /// Enumeration failed: leave the store alone, alert, and go unhealthy.
    async fn abort_pass(
        &self,
        started: Instant,
        started_at: DateTime<Utc>,
        e: StatsError,
    ) -> PassReport {
        error!(error = %e, "failed to list eventing functions, pass aborted");
        self.metrics.record_enumeration_failure();

        let alert = AlertEvent::new(
            Severity::Error,
            format!("Failed to list eventing functions: {e}"),
        )
        .with_context("error", e.to_string())
        .with_context("timestamp", started_at.to_rfc3339());
        self.notify(&alert).await;

        self.health_tx.send_modify(|h| {
            h.healthy = false;
            h.last_attempt_at = Some(started_at);
            h.last_error = Some(e.to_string());
        });

        PassReport {
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            completed: false,
            functions: Vec::new(),
            removed_records: 0,
            alerts: vec![alert],
            error: Some(e.to_string()),
        }
    }

    /// Steps for one function. Never fails; problems land in the report.
    async fn reconcile_function(&self, name: String) -> FunctionReport {
        let now = Utc::now();
        let mut errors = Vec::new();

        let (verdict, backlog) = match self.stats.fetch_stats(&name).await {
            Ok(stats) => (evaluate(&stats, &self.thresholds), Some(stats.backlog_size)),
            Err(e) => {
                warn!(function = %name, error = %e, "failed to fetch function stats");
                self.metrics.record_check_error();
                errors.push(e.to_string());
                (Verdict::fetch_failed(&e), None)
            }
        };

        // Read the previous record before writing the new one.
        let previous = match self.store.get_latest(&name) {
            Ok(previous) => {
                if previous.is_none() {
                    debug!(function = %name, status = %verdict.status, "first observation of function");
                }
                Some(previous)
            }
            Err(e) => {
                error!(function = %name, error = %e, "failed to read previous status");
                self.metrics.record_store_error();
                errors.push(format!("failed to read previous status: {e}"));
                None
            }
        };

        let persisted = match previous {
            // Without the previous record the new row would hide a transition.
            None => false,
            Some(_) => {
                let record = StatusRecord {
                    function: name.clone(),
                    status: verdict.status,
                    message: verdict.message.clone(),
                    timestamp: now,
                };
                match self.store.append_status(&record) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(function = %name, error = %e, "failed to persist status");
                        self.metrics.record_store_error();
                        errors.push(format!("failed to persist status: {e}"));
                        false
                    }
                }
            }
        };

        let previous_status = previous.flatten().map(|r| r.status);
        let mut alerts = Vec::new();

        let transition = matches!(previous_status, Some(prev) if prev != verdict.status);
        if let Some(prev) = previous_status.filter(|_| transition) {
            info!(function = %name, from = %prev, to = %verdict.status, "status transition");
            self.metrics.record_transition();
            alerts.push(transition_alert(&name, prev, &verdict, now));
        }

        for breach in &verdict.breaches {
            self.metrics.record_breach(breach.kind.as_str()).await;
            alerts.push(breach_alert(&name, breach, now));
        }
        if !verdict.breaches.is_empty() {
            debug!(
                function = %name,
                breaches = ?verdict.breach_kinds(),
                "function breaching thresholds"
            );
        }

        for alert in &alerts {
            self.notify(alert).await;
        }

        self.metrics
            .observe_function(&name, verdict.status, backlog, verdict.breaches.len())
            .await;

        FunctionReport {
            function: name,
            previous: previous_status,
            status: verdict.status,
            message: verdict.message.clone(),
            breaches: verdict.breach_kinds(),
            transition,
            persisted,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
            alerts,
        }
    }

    async fn notify(&self, alert: &AlertEvent) {
        if !self.notifier.send(alert).await {
            warn!(
                transport = self.notifier.name(),
                severity = %alert.severity,
                function = alert.function.as_deref().unwrap_or("-"),
                "alert delivery failed"
            );
            self.metrics.record_alert_failure();
        }
    }
}

/// Alert for a status change between two passes.
pub fn transition_alert(
    function: &str,
    previous: StatusCategory,
    verdict: &Verdict,
    timestamp: DateTime<Utc>,
) -> AlertEvent {
    let current = verdict.status;
    let (severity, message) = if current.is_degraded() {
        (
            Severity::Warning,
            format!("Function {function} status changed from {previous} to {current}: {}", verdict.message),
        )
    } else if current == StatusCategory::Deployed && previous.is_degraded() {
        (
            Severity::Info,
            format!("Function {function} recovered: status changed from {previous} to {current}"),
        )
    } else {
        (
            Severity::Info,
            format!("Function {function} status changed from {previous} to {current}"),
        )
    };

    AlertEvent::new(severity, message)
        .for_function(function)
        .with_context("function_name", function)
        .with_context("previous_status", previous.as_str())
        .with_context("current_status", current.as_str())
        .with_context("message", verdict.message.clone())
        .with_context("timestamp", timestamp.to_rfc3339())
}

/// Immediate alert for one breach kind.
pub fn breach_alert(function: &str, breach: &Breach, timestamp: DateTime<Utc>) -> AlertEvent {
    let mut alert = AlertEvent::new(breach.kind.severity(), breach.kind.headline())
        .for_function(function)
        .with_context("function_name", function)
        .with_context("breach", breach.kind.as_str())
        .with_context("timestamp", timestamp.to_rfc3339());
    for (key, value) in &breach.detail {
        alert.context.insert(key.clone(), value.clone());
    }
    alert
}
