use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::info;

use super::Decoder;

/// Image OCR through the Tesseract CLI.
///
/// This is the slowest decoder by far. The child process is killed when the
/// future is dropped, so a timeout around `decode` really stops the work.
#[derive(Debug, Clone)]
pub struct OcrDecoder {
    binary: String,
    lang: String,
}

impl OcrDecoder {
    pub fn new(binary: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            lang: lang.into(),
        }
    }
}

#[async_trait]
impl Decoder for OcrDecoder {
    async fn decode(&self, content: Bytes) -> anyhow::Result<String> {
        let image = tempfile::Builder::new()
            .prefix("intake-ocr-")
            .tempfile()
            .context("failed to create temp image file")?;
        tokio::fs::write(image.path(), &content)
            .await
            .context("failed to write temp image file")?;

        let output = Command::new(&self.binary)
            .arg(image.path())
            .arg("stdout")
            .args(["-l", &self.lang])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to launch OCR binary '{}'", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        info!("OCR extracted {} characters from {} byte image", text.len(), content.len());
        Ok(text)
    }
}
