pub mod candidates;
pub mod health;
pub mod ingest;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Record storage
        .route(
            "/candidates",
            get(candidates::handle_list).post(candidates::handle_create),
        )
        .route(
            "/candidates/:id",
            get(candidates::handle_get)
                .put(candidates::handle_update)
                .delete(candidates::handle_delete),
        )
        // Manual trigger; `/gmail` is the legacy path
        .route("/gmail", get(ingest::handle_trigger))
        .route("/api/v1/ingest/trigger", post(ingest::handle_trigger))
        .with_state(state)
}
