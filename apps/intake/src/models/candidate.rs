use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored candidate: extracted fields, the raw resume text, and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CandidateRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub college: String,
    pub fit_score: f64,
    #[serde(rename = "resumeText")]
    pub resume_text: Option<String>,
    /// Mailbox message id for pipeline-created records, `None` for API-created ones.
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCandidateRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub college: String,
    #[serde(default)]
    pub fit_score: f64,
    #[serde(default, rename = "resumeText", alias = "resume_text")]
    pub resume_text: Option<String>,
}

/// Partial update: absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCandidateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub college: Option<String>,
    pub fit_score: Option<f64>,
    #[serde(default, rename = "resumeText", alias = "resume_text")]
    pub resume_text: Option<String>,
}
