use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::state::AppState;

/// GET /gmail and POST /api/v1/ingest/trigger
/// Asks the scheduler for a cycle and acknowledges immediately, whatever it decided.
pub async fn handle_trigger(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let outcome = state.scheduler.trigger();
    info!("Manual ingestion trigger: {outcome:?}");
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}
