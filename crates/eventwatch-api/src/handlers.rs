//! HTTP handlers.
//!
//! Reads go straight to `StateStore`; checks go through the reconciler so
//! they share its re-entrancy guard.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::{info, warn};

use eventwatch_core::{StatusCategory, StatusRecord};
use eventwatch_health::{CheckOutcome, HealthState};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Health ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    /// `healthy` or `unhealthy`.
    pub watcher: &'static str,
    /// `healthy` or `degraded`.
    pub eventing: &'static str,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub deployed: usize,
    pub undeployed: usize,
    pub paused: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    /// Seconds since the server started.
    pub uptime: u64,
    pub last_pass_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub functions: Vec<StatusRecord>,
    pub summary: HealthSummary,
}

impl HealthReport {
    fn build(watcher: &HealthState, functions: Vec<StatusRecord>, uptime: u64) -> Self {
        let eventing_ok = !functions.iter().any(|r| r.status.is_degraded());
        Self {
            status: ComponentStatus {
                watcher: if watcher.healthy { "healthy" } else { "unhealthy" },
                eventing: if eventing_ok { "healthy" } else { "degraded" },
            },
            uptime,
            last_pass_at: watcher.last_pass_at.map(|t| t.to_rfc3339()),
            last_error: watcher.last_error.clone(),
            summary: summarize(&functions),
            functions,
        }
    }

    pub fn is_nominal(&self) -> bool {
        self.status.watcher == "healthy" && self.status.eventing == "healthy"
    }
}

/// Count latest records by lifecycle status.
pub fn summarize(records: &[StatusRecord]) -> HealthSummary {
    let count = |status: StatusCategory| records.iter().filter(|r| r.status == status).count();
    HealthSummary {
        total: records.len(),
        deployed: count(StatusCategory::Deployed),
        undeployed: count(StatusCategory::Undeployed),
        paused: count(StatusCategory::Paused),
    }
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let records = match state.store.get_all_latest() {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "health check could not read the status store");
            return error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE)
                .into_response();
        }
    };

    let report = HealthReport::build(
        &state.health.snapshot(),
        records,
        state.started.elapsed().as_secs(),
    );
    let code = if report.is_nominal() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report)).into_response()
}

// ── Functions ──────────────────────────────────────────────────

/// GET /api/v1/functions
pub async fn list_functions(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.get_all_latest() {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/functions/{name}
pub async fn get_function(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.get_latest(&name) {
        Ok(Some(record)) => ApiResponse::ok(record).into_response(),
        Ok(None) => error_response("function not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/functions/{name}/history
pub async fn function_history(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.history(&name) {
        Ok(rows) if rows.is_empty() => {
            error_response("function not found", StatusCode::NOT_FOUND).into_response()
        }
        Ok(rows) => ApiResponse::ok(rows).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Checks ─────────────────────────────────────────────────────

/// POST /api/v1/check
pub async fn run_check(State(state): State<ApiState>) -> impl IntoResponse {
    let Some(reconciler) = state.reconciler else {
        return error_response("checks are disabled", StatusCode::SERVICE_UNAVAILABLE)
            .into_response();
    };
    info!("on-demand pass requested");
    match reconciler.try_run_pass().await {
        Some(report) => ApiResponse::ok(report).into_response(),
        None => error_response("a pass is already running", StatusCode::CONFLICT).into_response(),
    }
}

/// POST /api/v1/functions/{name}/check
pub async fn check_function(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(reconciler) = state.reconciler else {
        return error_response("checks are disabled", StatusCode::SERVICE_UNAVAILABLE)
            .into_response();
    };
    info!(function = %name, "on-demand check requested");
    match reconciler.check_function(&name).await {
        Ok(CheckOutcome::Checked(report)) => ApiResponse::ok(report).into_response(),
        Ok(CheckOutcome::Busy) => {
            error_response("a pass is already running", StatusCode::CONFLICT).into_response()
        }
        Ok(CheckOutcome::UnknownFunction) => {
            error_response("function not found", StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => error_response(
            &format!("failed to list eventing functions: {e}"),
            StatusCode::BAD_GATEWAY,
        )
        .into_response(),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot().await;
    let body = eventwatch_metrics::render_prometheus(&snapshot);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
