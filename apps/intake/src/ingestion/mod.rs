//! Ingestion Orchestrator: one pipeline run per invocation:
//!
//!   Idle → Polling → Fetching → Extracting → Analyzing → Persisting → Done
//!
//! with `Aborted` reachable from every non-Idle state. A run handles at most one
//! message and one attachment. Every failure stays inside the run: it is logged
//! with stage, filename and cause, and the next cycle starts from a clean slate.
//!
//! The processed-message ledger is read during Polling and written only after
//! the run has reached its terminal state. Document failures close a message at
//! once; transient failures close it after `max_attempts` tries, so one bad
//! message never holds back the older ones behind it.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analysis::{AnalysisError, FieldExtractor};
use crate::extraction::{ExtractionError, RawDocument, SourceFormat, TextExtractor};
use crate::mailbox::{AttachmentMeta, MailboxError, MailboxProvider, HAS_ATTACHMENT_FILTER};
use crate::persistence::{Disposition, PersistError, PersistenceGateway, ProcessedLedger};

pub mod scheduler;

pub use scheduler::IngestScheduler;

// ────────────────────────────────────────────────────────────────────────────
// Run states and failures
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Polling,
    Fetching,
    Extracting,
    Analyzing,
    Persisting,
    Done,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Analyzing => "analyzing",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    UnsupportedFormat,
    DecodeFailure,
    AnalysisFailure,
    PersistFailure,
    ProviderFailure,
    Timeout,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// The cursor store, as opposed to the candidate store behind `Persist`.
    #[error("processed-message ledger unavailable: {0}")]
    Ledger(#[source] PersistError),

    #[error("{stage} timed out after {}s", .after.as_secs_f64())]
    Timeout { stage: RunState, after: Duration },
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Extraction(ExtractionError::UnsupportedFormat { .. }) => {
                FailureKind::UnsupportedFormat
            }
            Self::Extraction(_) => FailureKind::DecodeFailure,
            Self::Analysis(_) => FailureKind::AnalysisFailure,
            Self::Persist(_) | Self::Ledger(_) => FailureKind::PersistFailure,
            Self::Mailbox(_) => FailureKind::ProviderFailure,
            Self::Timeout { .. } => FailureKind::Timeout,
        }
    }

    /// Document failures: retrying the same attachment cannot help. An
    /// extraction timeout counts, since the parse it abandoned may still be
    /// holding a blocking thread.
    fn rejects_message(&self) -> bool {
        matches!(
            self,
            Self::Extraction(_)
                | Self::Timeout {
                    stage: RunState::Extracting,
                    ..
                }
        )
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// `Done` or `Aborted`.
    pub state: RunState,
    /// Last stage entered before the terminal state.
    pub reached: RunState,
    pub message_id: Option<String>,
    pub filename: Option<String>,
    pub candidate_id: Option<Uuid>,
    pub failure_kind: Option<FailureKind>,
    pub failure: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// How many refs to list per poll; the newest unprocessed one is picked.
    pub batch_size: u32,
    pub mailbox_timeout: Duration,
    pub extraction_timeout: Duration,
    pub analysis_timeout: Duration,
    pub persist_timeout: Duration,
    /// Transient failures a message may accumulate before it is marked `failed`.
    pub max_attempts: u32,
    /// Latest extracted text is written here when set.
    pub dump_path: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            mailbox_timeout: Duration::from_secs(30),
            extraction_timeout: Duration::from_secs(60),
            analysis_timeout: Duration::from_secs(60),
            persist_timeout: Duration::from_secs(15),
            max_attempts: 3,
            dump_path: None,
        }
    }
}

/// What a run that reached `Done` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    NothingToDo,
    NoAttachment,
    Created(Uuid),
}

/// Mutable per-run bookkeeping. Dropped at the end of the run.
struct Run {
    id: Uuid,
    state: RunState,
    message_id: Option<String>,
    filename: Option<String>,
}

impl Run {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Idle,
            message_id: None,
            filename: None,
        }
    }

    fn enter(&mut self, next: RunState) {
        debug!("{} -> {}", self.state, next);
        self.state = next;
    }
}

pub struct IngestionPipeline {
    mailbox: Arc<dyn MailboxProvider>,
    ledger: Arc<dyn ProcessedLedger>,
    text_extractor: TextExtractor,
    field_extractor: FieldExtractor,
    gateway: PersistenceGateway,
    settings: PipelineSettings,
}

impl IngestionPipeline {
    pub fn new(
        mailbox: Arc<dyn MailboxProvider>,
        ledger: Arc<dyn ProcessedLedger>,
        text_extractor: TextExtractor,
        field_extractor: FieldExtractor,
        gateway: PersistenceGateway,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            mailbox,
            ledger,
            text_extractor,
            field_extractor,
            gateway,
            settings,
        }
    }

    /// Runs one cycle end to end. Never fails: the outcome is in the report and the logs.
    pub async fn run_cycle(&self) -> RunReport {
        let mut run = Run::new();
        let span = info_span!("ingest_cycle", run_id = %run.id);

        async {
            let result = self.drive(&mut run).await;
            self.record_in_ledger(&run, &result).await;
            let report = finish(run, result);
            log_report(&report);
            report
        }
        .instrument(span)
        .await
    }

    /// Ledger reads share `persist_timeout` with candidate writes; a ledger
    /// failure is reported as `PipelineError::Ledger` (kind `PersistFailure`).
    async fn drive(&self, run: &mut Run) -> Result<Outcome, PipelineError> {
        let s = &self.settings;

        run.enter(RunState::Polling);
        let refs = bounded(
            RunState::Polling,
            s.mailbox_timeout,
            self.mailbox
                .list_attachment_messages(HAS_ATTACHMENT_FILTER, s.batch_size),
        )
        .await?;
        if refs.is_empty() {
            info!("No messages with attachments found");
            return Ok(Outcome::NothingToDo);
        }

        let ids: Vec<String> = refs.iter().map(|r| r.id.clone()).collect();
        let processed = bounded(RunState::Polling, s.persist_timeout, async {
            self.ledger
                .processed_among(&ids)
                .await
                .map_err(PipelineError::Ledger)
        })
        .await?;
        let Some(message) = refs.into_iter().find(|r| !processed.contains(&r.id)) else {
            debug!("All {} listed messages already processed", ids.len());
            return Ok(Outcome::NothingToDo);
        };
        run.message_id = Some(message.id.clone());

        run.enter(RunState::Fetching);
        let detail = bounded(
            RunState::Fetching,
            s.mailbox_timeout,
            self.mailbox.get_message(&message.id),
        )
        .await?;
        let Some(attachment) = select_attachment(&detail.attachments) else {
            info!("Message {} has no named attachment", message.id);
            return Ok(Outcome::NoAttachment);
        };
        run.filename = Some(attachment.filename.clone());
        info!(
            received_at = ?detail.received_at,
            "Downloading attachment {} ({}, {} bytes) from message {}",
            attachment.filename,
            attachment.mime_type.as_deref().unwrap_or("unknown type"),
            attachment.size,
            message.id
        );
        let data = bounded(
            RunState::Fetching,
            s.mailbox_timeout,
            self.mailbox
                .get_attachment(&message.id, &attachment.attachment_id),
        )
        .await?;
        let document = RawDocument::new(attachment.filename.clone(), data.bytes, data.encoding);

        run.enter(RunState::Extracting);
        let extracted = bounded(
            RunState::Extracting,
            s.extraction_timeout,
            self.text_extractor.extract(document),
        )
        .await?;
        if let Some(path) = &s.dump_path {
            if let Err(e) = tokio::fs::write(path, &extracted.text).await {
                warn!("Failed to write extracted text to {}: {e}", path.display());
            }
        }

        run.enter(RunState::Analyzing);
        let fields = bounded(
            RunState::Analyzing,
            s.analysis_timeout,
            self.field_extractor.extract_fields(&extracted.text),
        )
        .await?;

        run.enter(RunState::Persisting);
        let record = bounded(
            RunState::Persisting,
            s.persist_timeout,
            self.gateway
                .persist(&fields, &extracted.text, Some(&message.id)),
        )
        .await?;

        Ok(Outcome::Created(record.id))
    }

    /// The only cursor mutation. Runs after the terminal state is known.
    async fn record_in_ledger(&self, run: &Run, result: &Result<Outcome, PipelineError>) {
        let Some(message_id) = run.message_id.as_deref() else {
            return;
        };
        let (disposition, candidate_id) = match result {
            Ok(Outcome::Created(id)) => (Disposition::Completed, Some(*id)),
            Ok(Outcome::NoAttachment) => (Disposition::NoAttachment, None),
            Ok(Outcome::NothingToDo) => return,
            Err(e) if e.rejects_message() => (Disposition::Rejected, None),
            Err(_) => match self.count_attempt(message_id).await {
                Some(attempts) if attempts >= self.settings.max_attempts => {
                    warn!(
                        message_id,
                        "Giving up on message after {attempts} failed attempts"
                    );
                    (Disposition::Failed, None)
                }
                Some(attempts) => {
                    info!(
                        message_id,
                        "Message will be retried (attempt {attempts} of {})",
                        self.settings.max_attempts
                    );
                    return;
                }
                None => return,
            },
        };

        let write = bounded(RunState::Persisting, self.settings.persist_timeout, async {
            self.ledger
                .mark_processed(message_id, disposition, candidate_id)
                .await
                .map_err(PipelineError::Ledger)
        })
        .await;
        if let Err(e) = write {
            error!(
                message_id,
                "Failed to mark message as {}: {e}. It will be picked up again next cycle.",
                disposition.as_str()
            );
        }
    }

    async fn count_attempt(&self, message_id: &str) -> Option<u32> {
        let counted = bounded(RunState::Persisting, self.settings.persist_timeout, async {
            self.ledger
                .record_attempt(message_id)
                .await
                .map_err(PipelineError::Ledger)
        })
        .await;
        match counted {
            Ok(attempts) => Some(attempts),
            Err(e) => {
                error!(message_id, "Failed to count attempt: {e}");
                None
            }
        }
    }
}

/// Attachment policy: first PDF, else first supported format, else the first
/// named attachment (which extraction then rejects).
pub fn select_attachment(attachments: &[AttachmentMeta]) -> Option<&AttachmentMeta> {
    let named = || attachments.iter().filter(|a| !a.filename.trim().is_empty());
    named()
        .find(|a| SourceFormat::from_filename(&a.filename) == Some(SourceFormat::Pdf))
        .or_else(|| named().find(|a| SourceFormat::from_filename(&a.filename).is_some()))
        .or_else(|| named().next())
}

async fn bounded<T, E>(
    stage: RunState,
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, PipelineError>
where
    PipelineError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(PipelineError::from),
        Err(_) => Err(PipelineError::Timeout {
            stage,
            after: limit,
        }),
    }
}

fn finish(run: Run, result: Result<Outcome, PipelineError>) -> RunReport {
    let reached = run.state;
    let (state, candidate_id, failure_kind, failure) = match result {
        Ok(Outcome::Created(id)) => (RunState::Done, Some(id), None, None),
        Ok(_) => (RunState::Done, None, None, None),
        Err(e) => (RunState::Aborted, None, Some(e.kind()), Some(e.to_string())),
    };
    RunReport {
        run_id: run.id,
        state,
        reached,
        message_id: run.message_id,
        filename: run.filename,
        candidate_id,
        failure_kind,
        failure,
    }
}

fn log_report(report: &RunReport) {
    let message_id = report.message_id.as_deref().unwrap_or("-");
    let filename = report.filename.as_deref().unwrap_or("-");
    let cause = report.failure.as_deref().unwrap_or_default();
    match report.failure_kind {
        None => info!(
            message_id,
            filename,
            candidate_id = ?report.candidate_id,
            "Ingestion cycle done"
        ),
        Some(kind @ (FailureKind::UnsupportedFormat | FailureKind::DecodeFailure)) => warn!(
            stage = %report.reached,
            message_id,
            filename,
            kind = ?kind,
            "Ingestion cycle aborted: {cause}"
        ),
        Some(kind) => error!(
            stage = %report.reached,
            message_id,
            filename,
            kind = ?kind,
            "Ingestion cycle aborted: {cause}"
        ),
    }
}
