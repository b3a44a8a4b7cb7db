//! Processed-message ledger: the mailbox cursor.
//!
//! Read before a message is fetched, written once its run has ended. Only the
//! orchestrator touches it. A row without a disposition is a message that has
//! failed transiently and is still eligible; `attempts` counts those failures.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::PersistError;

/// Why a message will not be picked up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A candidate record was created from it.
    Completed,
    /// Its attachment can never be turned into text.
    Rejected,
    /// It carries no named attachment at all.
    NoAttachment,
    /// It kept failing transiently until the attempt budget ran out.
    Failed,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::NoAttachment => "no_attachment",
            Self::Failed => "failed",
        }
    }
}

#[async_trait]
pub trait ProcessedLedger: Send + Sync {
    /// The subset of `message_ids` that carry a disposition.
    async fn processed_among(&self, message_ids: &[String]) -> Result<HashSet<String>, PersistError>;

    async fn mark_processed(
        &self,
        message_id: &str,
        disposition: Disposition,
        candidate_id: Option<Uuid>,
    ) -> Result<(), PersistError>;

    /// Counts one transient failure and returns the total so far.
    async fn record_attempt(&self, message_id: &str) -> Result<u32, PersistError>;
}

#[derive(Clone)]
pub struct PgProcessedLedger {
    pool: PgPool,
}

impl PgProcessedLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedLedger for PgProcessedLedger {
    async fn processed_among(&self, message_ids: &[String]) -> Result<HashSet<String>, PersistError> {
        if message_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT message_id FROM processed_messages
            WHERE message_id = ANY($1) AND disposition IS NOT NULL
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn mark_processed(
        &self,
        message_id: &str,
        disposition: Disposition,
        candidate_id: Option<Uuid>,
    ) -> Result<(), PersistError> {
        sqlx::query(
            r#"
            INSERT INTO processed_messages (message_id, disposition, candidate_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id) DO UPDATE
                SET disposition = EXCLUDED.disposition,
                    candidate_id = EXCLUDED.candidate_id,
                    processed_at = now()
            "#,
        )
        .bind(message_id)
        .bind(disposition.as_str())
        .bind(candidate_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_attempt(&self, message_id: &str) -> Result<u32, PersistError> {
        let attempts: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO processed_messages (message_id, attempts)
            VALUES ($1, 1)
            ON CONFLICT (message_id) DO UPDATE
                SET attempts = processed_messages.attempts + 1,
                    processed_at = now()
            RETURNING attempts
            "#,
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempts.max(0) as u32)
    }
}
