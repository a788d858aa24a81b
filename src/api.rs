//! JSON-over-HTTP view of the [`Monitor`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::analysis::{ProcessAlert, StuckProcess};
use crate::error::{Error, Result};
use crate::monitor::{DriftReport, Monitor, ResourceAnalysis, SnapshotInfo};
use crate::scheduler::{CaptureOutcome, SchedulerStatus};
use crate::store::TimelineEntry;
use crate::system::process::ProcessRecord;
use crate::system::snapshot::Snapshot;

#[derive(Clone)]
pub struct ApiState {
    monitor: Arc<Monitor>,
    timeline_count: usize,
}

pub fn router(monitor: Arc<Monitor>, timeline_count: usize) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/latest-snapshot", get(latest_snapshot))
        .route("/current-processes", get(current_processes))
        .route("/process-details/{pid}", get(process_details))
        .route("/resource-analysis", get(resource_analysis))
        .route("/stuck-processes", get(stuck_processes))
        .route("/alerts", get(alerts))
        .route("/drift", get(drift))
        .route("/timeline", get(timeline))
        .route("/snapshot-info", get(snapshot_info))
        .route("/scheduler-status", get(scheduler_status))
        .route("/trigger-snapshot", post(trigger_snapshot))
        .with_state(ApiState {
            monitor,
            timeline_count,
        })
}

fn status_of(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InsufficientHistory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::CaptureInProgress => StatusCode::CONFLICT,
        Error::Io { .. } | Error::Corrupt { .. } | Error::Capture(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Runs a store-backed query off the async workers.
async fn blocking<T, F>(state: &ApiState, query: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Monitor) -> Result<T> + Send + 'static,
{
    let monitor = Arc::clone(&state.monitor);
    tokio::task::spawn_blocking(move || query(&monitor))
        .await
        .map_err(|e| Error::Internal(format!("query task failed: {e}")))?
}

async fn home() -> Json<serde_json::Value> {
    Json(json!({ "message": "driftx running" }))
}

async fn latest_snapshot(State(state): State<ApiState>) -> Result<Json<Snapshot>> {
    blocking(&state, Monitor::latest_snapshot).await.map(Json)
}

async fn current_processes(State(state): State<ApiState>) -> Result<Json<Vec<ProcessRecord>>> {
    blocking(&state, Monitor::current_processes).await.map(Json)
}

async fn process_details(
    State(state): State<ApiState>,
    Path(pid): Path<u32>,
) -> Result<Json<ProcessRecord>> {
    blocking(&state, move |m| m.process(pid)).await.map(Json)
}

async fn resource_analysis(State(state): State<ApiState>) -> Result<Json<ResourceAnalysis>> {
    blocking(&state, Monitor::resource_analysis).await.map(Json)
}

async fn stuck_processes(State(state): State<ApiState>) -> Result<Json<Vec<StuckProcess>>> {
    blocking(&state, Monitor::stuck_processes).await.map(Json)
}

async fn alerts(State(state): State<ApiState>) -> Result<Json<Vec<ProcessAlert>>> {
    blocking(&state, Monitor::alerts).await.map(Json)
}

async fn drift(State(state): State<ApiState>) -> Result<Json<DriftReport>> {
    blocking(&state, Monitor::drift).await.map(Json)
}

#[derive(Debug, Deserialize)]
struct TimelineParams {
    count: Option<usize>,
}

async fn timeline(
    State(state): State<ApiState>,
    Query(params): Query<TimelineParams>,
) -> Result<Json<Vec<TimelineEntry>>> {
    let count = params.count.unwrap_or(state.timeline_count);
    blocking(&state, move |m| m.timeline(count)).await.map(Json)
}

async fn snapshot_info(State(state): State<ApiState>) -> Result<Json<SnapshotInfo>> {
    blocking(&state, Monitor::snapshot_info).await.map(Json)
}

async fn scheduler_status(State(state): State<ApiState>) -> Json<SchedulerStatus> {
    Json(state.monitor.scheduler_status())
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    success: bool,
    #[serde(flatten)]
    outcome: Option<CaptureOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn trigger_snapshot(State(state): State<ApiState>) -> Response {
    match state.monitor.trigger_capture().await {
        Ok(outcome) => Json(TriggerResponse {
            success: true,
            outcome: Some(outcome),
            error: None,
        })
        .into_response(),
        Err(err) => {
            warn!(error = %err, "manual capture failed");
            (
                status_of(&err),
                Json(TriggerResponse {
                    success: false,
                    outcome: None,
                    error: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}
