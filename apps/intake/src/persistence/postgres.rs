use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CandidateStore, NewCandidate, PersistError};
use crate::models::candidate::{CandidateRecord, UpdateCandidateRequest};

/// PostgreSQL-backed candidate store.
#[derive(Clone)]
pub struct PgCandidateStore {
    pool: PgPool,
}

impl PgCandidateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateStore for PgCandidateStore {
    async fn insert(&self, candidate: NewCandidate) -> Result<CandidateRecord, PersistError> {
        insert_candidate(&self.pool, &candidate)
            .await
            .map_err(classify_insert_error)
    }
}

/// Constraint violations mean the row itself is unacceptable; anything else is
/// the database being unavailable or misbehaving.
fn classify_insert_error(err: sqlx::Error) -> PersistError {
    match err {
        sqlx::Error::Database(db)
            if matches!(db.kind(), ErrorKind::CheckViolation | ErrorKind::NotNullViolation) =>
        {
            PersistError::Rejected(db.message().to_string())
        }
        other => PersistError::Database(other),
    }
}

pub async fn insert_candidate(
    pool: &PgPool,
    candidate: &NewCandidate,
) -> Result<CandidateRecord, sqlx::Error> {
    sqlx::query_as::<_, CandidateRecord>(
        r#"
        INSERT INTO candidates
            (id, name, email, college, fit_score, resume_text, source_message_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&candidate.name)
    .bind(&candidate.email)
    .bind(&candidate.college)
    .bind(candidate.fit_score)
    .bind(&candidate.resume_text)
    .bind(&candidate.source_message_id)
    .fetch_one(pool)
    .await
}

pub async fn list_candidates(pool: &PgPool) -> Result<Vec<CandidateRecord>, sqlx::Error> {
    sqlx::query_as::<_, CandidateRecord>("SELECT * FROM candidates ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

pub async fn get_candidate(pool: &PgPool, id: Uuid) -> Result<Option<CandidateRecord>, sqlx::Error> {
    sqlx::query_as::<_, CandidateRecord>("SELECT * FROM candidates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Partial update; returns `None` when the id does not exist.
pub async fn update_candidate(
    pool: &PgPool,
    id: Uuid,
    update: &UpdateCandidateRequest,
) -> Result<Option<CandidateRecord>, sqlx::Error> {
    sqlx::query_as::<_, CandidateRecord>(
        r#"
        UPDATE candidates SET
            name = COALESCE($2, name),
            email = COALESCE($3, email),
            college = COALESCE($4, college),
            fit_score = COALESCE($5, fit_score),
            resume_text = COALESCE($6, resume_text)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&update.name)
    .bind(&update.email)
    .bind(&update.college)
    .bind(update.fit_score)
    .bind(&update.resume_text)
    .fetch_optional(pool)
    .await
}

/// Returns whether a row was deleted.
pub async fn delete_candidate(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM candidates WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
