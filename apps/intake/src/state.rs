use sqlx::PgPool;

use crate::ingestion::IngestScheduler;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Same instance the interval loop drives, so manual triggers share its run gate.
    pub scheduler: IngestScheduler,
}
