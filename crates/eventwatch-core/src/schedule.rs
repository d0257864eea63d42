//! Pass schedule: a fixed interval or a cron expression.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use croner::Cron;

use crate::config::{ConfigError, parse_duration};

/// When reconciliation passes fire.
///
/// A single token is a duration (`30s`, `5m`, bare seconds). Anything with
/// whitespace is a cron expression with five fields, or six when the first
/// one is seconds. Cron times are evaluated in UTC.
#[derive(Clone)]
pub enum Schedule {
    Interval(Duration),
    Cron { expr: String, cron: Arc<Cron> },
}

impl Schedule {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        if !s.contains(char::is_whitespace) {
            return match parse_duration(s) {
                Some(d) if !d.is_zero() => Ok(Schedule::Interval(d)),
                Some(_) => Err(ConfigError::Invalid(
                    "watcher.schedule must not be zero".to_string(),
                )),
                None => Err(ConfigError::Invalid(format!(
                    "watcher.schedule is neither a duration nor a cron expression: {s:?}"
                ))),
            };
        }

        let cron = Cron::new(s)
            .with_seconds_optional()
            .parse()
            .map_err(|e| {
                ConfigError::Invalid(format!("watcher.schedule {s:?} is not a valid cron: {e}"))
            })?;
        Ok(Schedule::Cron {
            expr: s.to_string(),
            cron: Arc::new(cron),
        })
    }

    /// The first fire time strictly after `now`, if there is one.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval(period) => chrono::Duration::from_std(*period)
                .ok()
                .and_then(|d| now.checked_add_signed(d)),
            Schedule::Cron { cron, .. } => cron.find_next_occurrence(&now, false).ok(),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Interval(period) => write!(f, "every {period:?}"),
            Schedule::Cron { expr, .. } => write!(f, "cron {expr:?}"),
        }
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Interval(period) => f.debug_tuple("Interval").field(period).finish(),
            Schedule::Cron { expr, .. } => f.debug_tuple("Cron").field(expr).finish(),
        }
    }
}
