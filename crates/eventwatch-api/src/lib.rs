//! eventwatch-api — HTTP surface of the watcher.
//!
//! Serves the aggregate health view built from the status store, the
//! Prometheus exposition, and a small REST API for reading statuses and
//! triggering checks on demand.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Aggregate health (200 nominal, 503 otherwise) |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/api/v1/functions` | Latest status of every function |
//! | GET | `/api/v1/functions/{name}` | Latest status of one function |
//! | GET | `/api/v1/functions/{name}/history` | Every stored status row, oldest first |
//! | POST | `/api/v1/check` | Run a full pass now |
//! | POST | `/api/v1/functions/{name}/check` | Check one function now |

pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};

use eventwatch_health::{HealthHandle, Reconciler};
use eventwatch_metrics::WatcherMetrics;
use eventwatch_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub health: HealthHandle,
    pub metrics: Arc<WatcherMetrics>,
    /// `None` disables the on-demand check routes (503).
    pub reconciler: Option<Arc<Reconciler>>,
    pub started: Instant,
}

impl ApiState {
    /// State wired to a running reconciler.
    pub fn new(store: StateStore, reconciler: Arc<Reconciler>) -> Self {
        Self {
            store,
            health: reconciler.health(),
            metrics: reconciler.metrics(),
            reconciler: Some(reconciler),
            started: Instant::now(),
        }
    }
}

/// Build the complete router (health + metrics + REST).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/functions", get(handlers::list_functions))
        .route("/functions/{name}", get(handlers::get_function))
        .route("/functions/{name}/history", get(handlers::function_history))
        .route("/functions/{name}/check", post(handlers::check_function))
        .route("/check", post(handlers::run_check));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
