//! Mailbox Provider contract. The orchestrator only sees these types; the Gmail
//! REST adapter lives in `gmail`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::extraction::TransferEncoding;

pub mod gmail;

pub use gmail::{GmailClient, OAuthCredentials};

/// Provider-side search expression for messages carrying attachments.
pub const HAS_ATTACHMENT_FILTER: &str = "has:attachment";

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mailbox API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("mailbox authentication failed: {0}")]
    Auth(String),

    #[error("unexpected mailbox payload: {0}")]
    Malformed(String),
}

/// A listed message. Providers return refs newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMeta {
    pub attachment_id: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDetail {
    pub id: String,
    pub received_at: Option<DateTime<Utc>>,
    /// Named attachments in MIME order, nested parts flattened.
    pub attachments: Vec<AttachmentMeta>,
}

#[derive(Debug, Clone)]
pub struct AttachmentData {
    pub bytes: Bytes,
    pub encoding: TransferEncoding,
}

#[async_trait]
pub trait MailboxProvider: Send + Sync {
    async fn list_attachment_messages(
        &self,
        filter: &str,
        limit: u32,
    ) -> Result<Vec<MessageRef>, MailboxError>;

    async fn get_message(&self, id: &str) -> Result<MessageDetail, MailboxError>;

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentData, MailboxError>;
}
