//! Dispatcher control routes.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use courier_common::error::AppError;
use courier_common::types::AuditRecord;
use courier_engine::controller::SchedulerStatus;

use crate::state::AppState;

/// Records returned by the log endpoint when no limit is given.
const DEFAULT_LOG_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/dispatcher/start", post(start))
        .route("/api/dispatcher/stop", post(stop))
        .route("/api/dispatcher/status", get(status))
        .route("/api/dispatcher/logs", get(logs))
}

#[derive(Debug, Default, Deserialize)]
pub struct StartParams {
    /// Overrides the configured schedule for this start.
    pub schedule: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub is_running: bool,
    #[serde(flatten)]
    pub scheduler: SchedulerStatus,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub status: &'static str,
    pub data: Vec<AuditRecord>,
}

/// POST /api/dispatcher/start — Start the dispatcher (no-op if running).
async fn start(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> Result<Json<MessageResponse>, AppError> {
    match params.schedule.as_deref() {
        Some(schedule) => state.controller.start(schedule).await?,
        None => state.controller.start_default().await?,
    }

    Ok(Json(MessageResponse {
        status: "success",
        message: "Dispatcher started",
    }))
}

/// POST /api/dispatcher/stop — Stop the dispatcher (no-op if stopped).
async fn stop(State(state): State<AppState>) -> Json<MessageResponse> {
    state.controller.stop().await;
    Json(MessageResponse {
        status: "success",
        message: "Dispatcher stopped",
    })
}

/// GET /api/dispatcher/status — Whether a schedule is registered.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let scheduler = state.controller.status().await;
    Json(StatusResponse {
        status: "success",
        is_running: scheduler.running,
        scheduler,
    })
}

/// GET /api/dispatcher/logs — Audit records, most recent first.
async fn logs(
    State(state): State<AppState>,
    Query(params): Query<LogParams>,
) -> Result<Json<LogsResponse>, AppError> {
    let records = state
        .controller
        .audit_log(params.limit.unwrap_or(DEFAULT_LOG_LIMIT))
        .await?;
    Ok(Json(LogsResponse {
        status: "success",
        data: records,
    }))
}
