use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bytes::Bytes;

use super::Decoder;

/// PDF text layer via `pdf-extract`. Runs on a blocking thread so a panic inside
/// the parser surfaces as a join error instead of unwinding through the pipeline.
///
/// Blocking tasks cannot be cancelled: when the extraction timeout fires the
/// parse keeps its thread until it finishes on its own. The orchestrator rejects
/// such a document so it is never handed to another thread.
pub struct PdfDecoder;

#[async_trait]
impl Decoder for PdfDecoder {
    async fn decode(&self, content: Bytes) -> anyhow::Result<String> {
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&content))
            .await
            .context("PDF parser aborted")?
            .map_err(|e| anyhow!("malformed PDF: {e}"))
    }
}
