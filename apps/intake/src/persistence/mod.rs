//! Persistence Gateway: turns pipeline output into a stored candidate record.
//!
//! Create-only: no merge, no dedup by email. Cross-cycle idempotency is the
//! ledger's job (`ledger`), not the gateway's.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::analysis::CandidateFields;
use crate::models::candidate::CandidateRecord;

pub mod ledger;
pub mod postgres;

pub use ledger::{Disposition, PgProcessedLedger, ProcessedLedger};
pub use postgres::PgCandidateStore;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record rejected: {0}")]
    Rejected(String),
}

/// Insert payload in storage terms.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCandidate {
    pub name: String,
    pub email: String,
    pub college: String,
    pub fit_score: f64,
    pub resume_text: Option<String>,
    pub source_message_id: Option<String>,
}

/// The record-store write target.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn insert(&self, candidate: NewCandidate) -> Result<CandidateRecord, PersistError>;
}

#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn CandidateStore>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn CandidateStore>) -> Self {
        Self { store }
    }

    pub async fn persist(
        &self,
        fields: &CandidateFields,
        raw_text: &str,
        source_message_id: Option<&str>,
    ) -> Result<CandidateRecord, PersistError> {
        let record = self
            .store
            .insert(NewCandidate {
                name: fields.name.clone(),
                email: fields.email.clone(),
                college: fields.college.clone(),
                fit_score: fields.fit_score,
                resume_text: Some(raw_text.to_string()),
                source_message_id: source_message_id.map(str::to_string),
            })
            .await?;

        info!(
            "Candidate {} created: name={:?} email={:?} fit_score={}",
            record.id, record.name, record.email, record.fit_score
        );
        Ok(record)
    }
}
