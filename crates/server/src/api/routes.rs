use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, indexers, middleware::metrics_middleware, pipeline, tasks};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Indexers
        .route("/indexers/availability", get(indexers::get_availability))
        // Tasks
        .route("/tasks/{id}", get(tasks::get_task))
        // Pipeline runs
        .route("/pipeline/run", post(pipeline::start_run))
        .route("/pipeline/cancel", post(pipeline::cancel_run))
        .route("/pipeline/status", get(pipeline::get_status));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
