//! Pipeline run API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use harvest_core::{PipelineError, RunOptions};

use super::handlers::ErrorResponse;
use crate::runs::{RunRequest, RunStatus};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RunStartedResponse {
    pub status: String,
    pub options: RunOptions,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a run over the wanted catalog. The body is optional; its fields
/// override the configured run options.
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> Result<(StatusCode, Json<RunStartedResponse>), impl IntoResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    match state.runs().start(request).await {
        Ok(options) => Ok((
            StatusCode::ACCEPTED,
            Json(RunStartedResponse {
                status: "started".to_string(),
                options,
            }),
        )),
        Err(e @ PipelineError::AlreadyRunning) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(e.to_string())),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )),
    }
}

/// Cancel the run in progress.
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, impl IntoResponse> {
    if state.runs().cancel() {
        Ok(Json(MessageResponse {
            message: "Cancellation requested".to_string(),
        }))
    } else {
        Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("No pipeline run in progress")),
        ))
    }
}

/// Running flag and the outcome of the last run.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<RunStatus> {
    Json(state.runs().status().await)
}
