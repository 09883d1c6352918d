//! Task API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use harvest_core::task::{Release, Task, TaskError};

use super::handlers::ErrorResponse;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// A task with its candidate releases in discovery order.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    pub releases: Vec<Release>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get a task by id.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, (StatusCode, Json<ErrorResponse>)> {
    let task = match state.tasks().get(&id) {
        Ok(Some(task)) => task,
        Ok(None) => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(format!("Task not found: {}", id))),
            ))
        }
        Err(e) => return Err(internal_error(e)),
    };

    let releases = state
        .releases()
        .list_for_task(&task.id)
        .map_err(internal_error)?;

    Ok(Json(TaskResponse { task, releases }))
}

fn internal_error(e: TaskError) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %e, "Task store error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(e.to_string())),
    )
}
