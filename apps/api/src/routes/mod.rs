pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::agent::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Optimization API
        .route("/api/v1/optimize", post(handlers::handle_optimize))
        .route("/api/v1/score", post(handlers::handle_score))
        .route("/api/v1/fit", post(handlers::handle_fit))
        .route("/api/v1/runs", get(handlers::handle_list_runs))
        .route("/api/v1/runs/:id", get(handlers::handle_get_run))
        .with_state(state)
}
