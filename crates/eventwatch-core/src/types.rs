//! Domain types shared across the watcher.
//!
//! Lifecycle status and threshold breaches are kept on separate axes:
//! a `StatusRecord` only ever carries the lifecycle category, while
//! breaches surface as alerts and metrics.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of a deployed eventing function.
pub type FunctionName = String;

// ── Status ────────────────────────────────────────────────────────

/// Lifecycle status of an eventing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Deployed,
    Undeployed,
    Paused,
    Deploying,
    Undeploying,
    /// The watcher could not read the function's stats.
    Error,
}

impl StatusCategory {
    pub const ALL: [StatusCategory; 6] = [
        StatusCategory::Deployed,
        StatusCategory::Undeployed,
        StatusCategory::Paused,
        StatusCategory::Deploying,
        StatusCategory::Undeploying,
        StatusCategory::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Deployed => "deployed",
            StatusCategory::Undeployed => "undeployed",
            StatusCategory::Paused => "paused",
            StatusCategory::Deploying => "deploying",
            StatusCategory::Undeploying => "undeploying",
            StatusCategory::Error => "error",
        }
    }

    /// Parse a server-reported status string (case-insensitive).
    ///
    /// Returns `None` for anything outside the enumerated set; callers
    /// decide the fallback.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw))
    }

    /// Destinations that warrant a warning when a function moves into them.
    pub fn is_degraded(&self) -> bool {
        matches!(self, StatusCategory::Error | StatusCategory::Paused)
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Persisted record ──────────────────────────────────────────────

/// One appended row of the status table.
///
/// For a given function the row with the greatest timestamp is the
/// latest; older rows are history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub function: FunctionName,
    pub status: StatusCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// ── Alerts ────────────────────────────────────────────────────────

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient alert handed to a notifier. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub severity: Severity,
    /// Subject function; `None` for process-level alerts.
    pub function: Option<FunctionName>,
    pub message: String,
    pub context: Map<String, Value>,
}

impl AlertEvent {
    /// A process-level alert with an empty context.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            function: None,
            message: message.into(),
            context: Map::new(),
        }
    }

    /// Attach the subject function.
    pub fn for_function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    /// Add one context entry.
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}
