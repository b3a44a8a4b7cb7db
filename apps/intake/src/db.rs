use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

const CREATE_CANDIDATES: &str = r#"
CREATE TABLE IF NOT EXISTS candidates (
    id                UUID PRIMARY KEY,
    name              TEXT NOT NULL DEFAULT '',
    email             TEXT NOT NULL DEFAULT '',
    college           TEXT NOT NULL DEFAULT '',
    fit_score         DOUBLE PRECISION NOT NULL DEFAULT 0
                      CHECK (fit_score >= 0 AND fit_score <= 100),
    resume_text       TEXT,
    source_message_id TEXT,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_PROCESSED_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS processed_messages (
    message_id   TEXT PRIMARY KEY,
    -- NULL while the message is still eligible for another attempt
    disposition  TEXT,
    attempts     INTEGER NOT NULL DEFAULT 0,
    candidate_id UUID REFERENCES candidates (id) ON DELETE SET NULL,
    processed_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the `candidates` table and the processed-message ledger if missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in [CREATE_CANDIDATES, CREATE_PROCESSED_MESSAGES] {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Database schema ready");
    Ok(())
}
