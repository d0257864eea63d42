//! Health evaluation — pure classification of one function's stats.
//!
//! The lifecycle status comes straight from the server-reported composite
//! status. Breaches are evaluated independently of it and of each other;
//! every applicable breach is reported.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::warn;

use eventwatch_core::{Severity, StatusCategory};
use eventwatch_stats::{FunctionStatus, RawFunctionStats};

/// Headline used when no breach is present.
pub const OPERATING_NORMALLY: &str = "Function is operating normally";

/// Kinds of breach, declared in headline precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachKind {
    RedeployRequired,
    BacklogExceeded,
    ExecutionFailures,
    Timeouts,
}

impl BreachKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreachKind::RedeployRequired => "redeploy_required",
            BreachKind::BacklogExceeded => "backlog_exceeded",
            BreachKind::ExecutionFailures => "execution_failures",
            BreachKind::Timeouts => "timeouts",
        }
    }

    /// Message used when this breach drives the verdict headline.
    pub fn headline(&self) -> &'static str {
        match self {
            BreachKind::RedeployRequired => "Function requires redeployment",
            BreachKind::BacklogExceeded => "DCP backlog size exceeds threshold",
            BreachKind::ExecutionFailures => "Function has execution failures",
            BreachKind::Timeouts => "Function has timeout failures",
        }
    }

    /// Fixed severity of the immediate alert for this breach.
    pub fn severity(&self) -> Severity {
        match self {
            BreachKind::BacklogExceeded => Severity::Error,
            BreachKind::RedeployRequired
            | BreachKind::ExecutionFailures
            | BreachKind::Timeouts => Severity::Warning,
        }
    }
}

impl fmt::Display for BreachKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected condition with its supporting numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breach {
    pub kind: BreachKind,
    pub detail: Map<String, Value>,
}

impl Breach {
    fn new(kind: BreachKind, detail: Value) -> Self {
        let detail = match detail {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { kind, detail }
    }
}

/// Thresholds the evaluator checks against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub backlog_threshold: u64,
}

/// Classification of one function at one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub status: StatusCategory,
    pub message: String,
    /// Sorted by precedence; at most one entry per kind.
    pub breaches: Vec<Breach>,
}

impl Verdict {
    /// Verdict for a function whose stats could not be fetched.
    pub fn fetch_failed(cause: &dyn fmt::Display) -> Self {
        Self {
            status: StatusCategory::Error,
            message: format!("Error checking function: {cause}"),
            breaches: Vec::new(),
        }
    }

    /// `true` when no breach was detected.
    pub fn is_healthy(&self) -> bool {
        self.breaches.is_empty()
    }

    pub fn breach_kinds(&self) -> Vec<BreachKind> {
        self.breaches.iter().map(|b| b.kind).collect()
    }
}

/// Classify one function's stats.
pub fn evaluate(stats: &RawFunctionStats, thresholds: &Thresholds) -> Verdict {
    let mut breaches = Vec::new();

    if stats.status.redeploy_required {
        breaches.push(Breach::new(
            BreachKind::RedeployRequired,
            json!({
                "composite_status": stats.status.composite_status,
                "deployment_status": stats.status.deployment_status,
                "processing_status": stats.status.processing_status,
            }),
        ));
    }

    if stats.backlog_size > thresholds.backlog_threshold {
        breaches.push(Breach::new(
            BreachKind::BacklogExceeded,
            json!({
                "backlog_size": stats.backlog_size,
                "threshold": thresholds.backlog_threshold,
            }),
        ));
    }

    let exec = &stats.execution;
    if exec.on_update_failure > 0 || exec.on_delete_failure > 0 {
        breaches.push(Breach::new(
            BreachKind::ExecutionFailures,
            json!({
                "on_update_failure": exec.on_update_failure,
                "on_delete_failure": exec.on_delete_failure,
            }),
        ));
    }

    if stats.failures.timeout_count > 0 {
        breaches.push(Breach::new(
            BreachKind::Timeouts,
            json!({ "timeout_count": stats.failures.timeout_count }),
        ));
    }

    breaches.sort_by_key(|b| b.kind);
    let message = breaches
        .first()
        .map(|b| b.kind.headline())
        .unwrap_or(OPERATING_NORMALLY)
        .to_string();

    Verdict {
        status: normalize_status(&stats.name, &stats.status),
        message,
        breaches,
    }
}

/// Map the server's composite status onto [`StatusCategory`].
///
/// Unrecognized values fall back to `undeployed` and are logged.
pub fn normalize_status(function: &str, status: &FunctionStatus) -> StatusCategory {
    match StatusCategory::parse(&status.composite_status) {
        Some(category) => category,
        None => {
            warn!(
                %function,
                raw = %status.composite_status,
                "unrecognized composite status, treating as undeployed"
            );
            StatusCategory::Undeployed
        }
    }
}
