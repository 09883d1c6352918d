//! Indexer availability handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::error;

use harvest_core::indexer::AvailabilitySnapshot;

use super::handlers::ErrorResponse;
use crate::state::AppState;

/// Counts of available, cooling-down and disabled indexers.
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AvailabilitySnapshot>, impl IntoResponse> {
    state.health().availability().map(Json).map_err(|e| {
        error!(error = %e, "Failed to read indexer availability");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
    })
}
