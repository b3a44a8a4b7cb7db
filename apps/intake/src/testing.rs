//! In-memory fakes for the pipeline seams. Test builds only.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::extraction::{Decoder, TransferEncoding};
use crate::llm_client::{AnalysisProvider, LlmError};
use crate::mailbox::{
    AttachmentData, AttachmentMeta, MailboxError, MailboxProvider, MessageDetail, MessageRef,
};
use crate::models::candidate::CandidateRecord;
use crate::persistence::{CandidateStore, Disposition, NewCandidate, PersistError, ProcessedLedger};

// ────────────────────────────────────────────────────────────────────────────
// Decoder
// ────────────────────────────────────────────────────────────────────────────

pub struct FakeDecoder {
    result: Result<String, String>,
    hang: bool,
    calls: AtomicUsize,
    last_input: Mutex<Option<Bytes>>,
}

impl FakeDecoder {
    pub fn returning(text: &str) -> Self {
        Self::with_result(Ok(text.to_string()))
    }

    pub fn failing(reason: &str) -> Self {
        Self::with_result(Err(reason.to_string()))
    }

    /// Never finishes, like a parser stuck on a pathological file.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::returning("")
        }
    }

    fn with_result(result: Result<String, String>) -> Self {
        Self {
            result,
            hang: false,
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<Bytes> {
        self.last_input.lock().unwrap().clone()
    }
}

#[async_trait]
impl Decoder for FakeDecoder {
    async fn decode(&self, content: Bytes) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(content);
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.result.clone().map_err(|reason| anyhow::anyhow!(reason))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Analysis provider
// ────────────────────────────────────────────────────────────────────────────

enum ProviderMode {
    Respond(Value),
    Fail,
    /// Never answers.
    Hang,
    /// Answers once `release` is called.
    Gated(Value),
    /// Answers with a non-object for prompts containing the marker.
    Selective { marker: String, value: Value },
}

pub struct FakeAnalysisProvider {
    mode: ProviderMode,
    calls: AtomicUsize,
    last_schema: Mutex<Option<Value>>,
    entered: Notify,
    released: Notify,
}

impl FakeAnalysisProvider {
    fn with_mode(mode: ProviderMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            last_schema: Mutex::new(None),
            entered: Notify::new(),
            released: Notify::new(),
        }
    }

    pub fn responding(response: Value) -> Self {
        Self::with_mode(ProviderMode::Respond(response))
    }

    pub fn failing() -> Self {
        Self::with_mode(ProviderMode::Fail)
    }

    pub fn hanging() -> Self {
        Self::with_mode(ProviderMode::Hang)
    }

    pub fn gated(response: Value) -> Self {
        Self::with_mode(ProviderMode::Gated(response))
    }

    /// Garbage for any resume containing `marker`, `response` for the rest.
    pub fn garbling(marker: &str, response: Value) -> Self {
        Self::with_mode(ProviderMode::Selective {
            marker: marker.to_string(),
            value: response,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_schema(&self) -> Option<Value> {
        self.last_schema.lock().unwrap().clone()
    }

    /// Resolves once a gated call is waiting inside `analyze`.
    pub async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl AnalysisProvider for FakeAnalysisProvider {
    async fn analyze(&self, prompt: &str, schema: &Value) -> Result<Value, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_schema.lock().unwrap() = Some(schema.clone());
        match &self.mode {
            ProviderMode::Respond(value) => Ok(value.clone()),
            ProviderMode::Fail => Err(LlmError::Api {
                status: 500,
                message: "model unavailable".to_string(),
            }),
            ProviderMode::Hang => std::future::pending().await,
            ProviderMode::Gated(value) => {
                self.entered.notify_one();
                self.released.notified().await;
                Ok(value.clone())
            }
            ProviderMode::Selective { marker, value } => {
                if prompt.contains(marker.as_str()) {
                    Ok(Value::Array(vec![Value::from("not"), Value::from("an object")]))
                } else {
                    Ok(value.clone())
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Mailbox
// ────────────────────────────────────────────────────────────────────────────

struct FakeMessage {
    detail: MessageDetail,
    payloads: HashMap<String, Bytes>,
}

/// Messages are listed in insertion order, so the first one added is the newest.
#[derive(Default)]
pub struct FakeMailbox {
    messages: Vec<FakeMessage>,
    fail_listing: bool,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    attachment_calls: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_listing: true,
            ..Self::default()
        }
    }

    /// Adds a message whose attachments are `(filename, raw content)` pairs.
    pub fn with_message(mut self, id: &str, attachments: &[(&str, &str)]) -> Self {
        let mut metas = Vec::new();
        let mut payloads = HashMap::new();
        for (i, (filename, content)) in attachments.iter().enumerate() {
            let attachment_id = format!("{id}-att-{i}");
            metas.push(AttachmentMeta {
                attachment_id: attachment_id.clone(),
                filename: filename.to_string(),
                mime_type: None,
                size: content.len() as u64,
            });
            payloads.insert(attachment_id, Bytes::from(URL_SAFE.encode(content.as_bytes())));
        }
        self.messages.push(FakeMessage {
            detail: MessageDetail {
                id: id.to_string(),
                received_at: Some(Utc::now()),
                attachments: metas,
            },
            payloads,
        });
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn attachment_calls(&self) -> usize {
        self.attachment_calls.load(Ordering::SeqCst)
    }

    fn find(&self, id: &str) -> Result<&FakeMessage, MailboxError> {
        self.messages
            .iter()
            .find(|m| m.detail.id == id)
            .ok_or_else(|| MailboxError::Api {
                status: 404,
                message: format!("message {id} not found"),
            })
    }
}

#[async_trait]
impl MailboxProvider for FakeMailbox {
    async fn list_attachment_messages(
        &self,
        _filter: &str,
        limit: u32,
    ) -> Result<Vec<MessageRef>, MailboxError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing {
            return Err(MailboxError::Auth("refresh token revoked".to_string()));
        }
        Ok(self
            .messages
            .iter()
            .take(limit as usize)
            .map(|m| MessageRef {
                id: m.detail.id.clone(),
            })
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<MessageDetail, MailboxError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.find(id)?.detail.clone())
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentData, MailboxError> {
        self.attachment_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .find(message_id)?
            .payloads
            .get(attachment_id)
            .cloned()
            .ok_or_else(|| MailboxError::Malformed(format!("no attachment {attachment_id}")))?;
        Ok(AttachmentData {
            bytes,
            encoding: TransferEncoding::Base64Url,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stores
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryCandidateStore {
    records: Mutex<Vec<CandidateRecord>>,
    reject: bool,
    attempts: AtomicUsize,
}

impl MemoryCandidateStore {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn inserted(&self) -> Vec<CandidateRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn insert_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn insert(&self, candidate: NewCandidate) -> Result<CandidateRecord, PersistError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(PersistError::Rejected("store is read-only".to_string()));
        }
        let record = CandidateRecord {
            id: Uuid::new_v4(),
            name: candidate.name,
            email: candidate.email,
            college: candidate.college,
            fit_score: candidate.fit_score,
            resume_text: candidate.resume_text,
            source_message_id: candidate.source_message_id,
            created_at: Utc::now(),
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<String, Disposition>>,
    attempts: Mutex<HashMap<String, u32>>,
    unavailable: bool,
}

impl MemoryLedger {
    /// Every call fails, like a database that is down.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), PersistError> {
        if self.unavailable {
            return Err(PersistError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    pub fn disposition(&self, message_id: &str) -> Option<Disposition> {
        self.entries.lock().unwrap().get(message_id).copied()
    }

    pub fn attempts(&self, message_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(message_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProcessedLedger for MemoryLedger {
    async fn processed_among(&self, message_ids: &[String]) -> Result<HashSet<String>, PersistError> {
        self.check()?;
        let entries = self.entries.lock().unwrap();
        Ok(message_ids
            .iter()
            .filter(|id| entries.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn mark_processed(
        &self,
        message_id: &str,
        disposition: Disposition,
        _candidate_id: Option<Uuid>,
    ) -> Result<(), PersistError> {
        self.check()?;
        self.entries
            .lock()
            .unwrap()
            .insert(message_id.to_string(), disposition);
        Ok(())
    }

    async fn record_attempt(&self, message_id: &str) -> Result<u32, PersistError> {
        self.check()?;
        let mut attempts = self.attempts.lock().unwrap();
        let count = attempts.entry(message_id.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
