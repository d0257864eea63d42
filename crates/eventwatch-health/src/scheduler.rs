//! Trigger for reconciliation passes: a fixed interval or cron fire times.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use eventwatch_core::Schedule;

use crate::reconciler::Reconciler;

/// Source of scheduler ticks. Both flavours tick once immediately.
enum Ticker {
    Interval(Interval),
    Cron {
        schedule: Schedule,
        started: bool,
        last_fire: Option<DateTime<Utc>>,
    },
}

impl Ticker {
    fn new(schedule: Schedule) -> Self {
        match schedule {
            Schedule::Interval(period) => {
                let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Ticker::Interval(interval)
            }
            schedule => Ticker::Cron {
                schedule,
                started: false,
                last_fire: None,
            },
        }
    }

    async fn tick(&mut self) {
        match self {
            Ticker::Interval(interval) => {
                interval.tick().await;
            }
            Ticker::Cron {
                schedule,
                started,
                last_fire,
            } => {
                if !std::mem::replace(started, true) {
                    return;
                }
                // Never fire the same occurrence twice if the timer wakes early.
                let now = Utc::now();
                let from = last_fire.map_or(now, |last| last.max(now));
                let Some(next) = schedule.next_after(from) else {
                    warn!(%schedule, "schedule has no further fire times");
                    return std::future::pending().await;
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                match Instant::now().checked_add(wait) {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
                *last_fire = Some(next);
            }
        }
    }
}

/// Run a pass on every tick of `schedule` until `shutdown` flips to `true`.
///
/// The first pass starts immediately. Cron schedules then sleep until each
/// next fire time. Each pass runs on its own task; a tick that lands while
/// the previous pass is still running is skipped. On shutdown the in-flight
/// pass, if any, is allowed to finish.
pub async fn run_scheduler(
    reconciler: Arc<Reconciler>,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(%schedule, "pass scheduler started");
    let mut ticker = Ticker::new(schedule);
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                    debug!("previous pass still running, tick skipped");
                    reconciler.metrics().record_pass_skipped();
                    continue;
                }
                let reconciler = Arc::clone(&reconciler);
                in_flight = Some(tokio::spawn(async move {
                    if reconciler.try_run_pass().await.is_none() {
                        // An on-demand check or pass held the lock.
                        reconciler.metrics().record_pass_skipped();
                    }
                }));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    if let Some(handle) = in_flight {
        if let Err(e) = handle.await {
            warn!(error = %e, "in-flight pass ended abnormally");
        }
    }
    info!("pass scheduler stopped");
}
