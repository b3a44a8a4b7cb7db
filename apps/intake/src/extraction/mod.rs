//! Text Extractor: turns raw attachment bytes into plain text.
//!
//! Dispatch is by filename suffix only (case-insensitive). Each format has its own
//! `Decoder`; the extractor owns transfer-encoding decoding, normalization and the
//! non-empty invariant so decoders stay format-focused.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub mod docx;
pub mod ocr;
pub mod pdf;

pub use docx::DocxDecoder;
pub use ocr::OcrDecoder;
pub use pdf::PdfDecoder;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Pdf,
    Docx,
    Image,
}

impl SourceFormat {
    /// Resolves the format from a filename suffix. `None` means unsupported.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.trim().to_lowercase();
        if lower.ends_with(".pdf") {
            Some(Self::Pdf)
        } else if lower.ends_with(".docx") {
            Some(Self::Docx)
        } else if lower.ends_with(".png") || lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            Some(Self::Image)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the attachment payload is encoded on the wire. Gmail's URL-safe base64
/// is the only encoding a mailbox delivers today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// URL-safe alphabet, padding optional.
    Base64Url,
}

/// A downloaded attachment. Lives for one pipeline run only.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub filename: String,
    pub bytes: Bytes,
    pub encoding: TransferEncoding,
}

impl RawDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>, encoding: TransferEncoding) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            encoding,
        }
    }

    /// Strips the transfer encoding, yielding the document's binary content.
    fn into_content(self) -> Result<Bytes, base64::DecodeError> {
        match self.encoding {
            TransferEncoding::Base64Url => {
                BASE64_URL.decode(trim_ascii(&self.bytes)).map(Bytes::from)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Normalized, never empty.
    pub text: String,
    pub source_format: SourceFormat,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported file format: {filename}")]
    UnsupportedFormat { filename: String },

    #[error("failed to decode {format} document: {reason}")]
    DecodeFailure { format: SourceFormat, reason: String },

    #[error("{format} document produced no text")]
    EmptyText { format: SourceFormat },
}

// ────────────────────────────────────────────────────────────────────────────
// Decoder trait
// ────────────────────────────────────────────────────────────────────────────

/// One format-specific decoder. Implementations must not panic across this
/// boundary; blocking work belongs on a blocking thread.
#[async_trait]
pub trait Decoder: Send + Sync {
    async fn decode(&self, content: Bytes) -> anyhow::Result<String>;
}

// ────────────────────────────────────────────────────────────────────────────
// TextExtractor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TextExtractor {
    pdf: Arc<dyn Decoder>,
    docx: Arc<dyn Decoder>,
    image: Arc<dyn Decoder>,
}

impl TextExtractor {
    pub fn new(pdf: Arc<dyn Decoder>, docx: Arc<dyn Decoder>, image: Arc<dyn Decoder>) -> Self {
        Self { pdf, docx, image }
    }

    /// Production wiring: pdf-extract, docx-rs and the given OCR decoder.
    pub fn with_ocr(ocr: OcrDecoder) -> Self {
        Self::new(Arc::new(PdfDecoder), Arc::new(DocxDecoder), Arc::new(ocr))
    }

    fn decoder_for(&self, format: SourceFormat) -> &dyn Decoder {
        match format {
            SourceFormat::Pdf => self.pdf.as_ref(),
            SourceFormat::Docx => self.docx.as_ref(),
            SourceFormat::Image => self.image.as_ref(),
        }
    }

    pub async fn extract(&self, document: RawDocument) -> Result<ExtractedText, ExtractionError> {
        let format = SourceFormat::from_filename(&document.filename).ok_or_else(|| {
            ExtractionError::UnsupportedFormat {
                filename: document.filename.clone(),
            }
        })?;

        let filename = document.filename.clone();
        let content = document
            .into_content()
            .map_err(|e| ExtractionError::DecodeFailure {
                format,
                reason: format!("invalid transfer encoding: {e}"),
            })?;

        debug!("Decoding {filename} as {format} ({} bytes)", content.len());

        let raw = self
            .decoder_for(format)
            .decode(content)
            .await
            .map_err(|e| ExtractionError::DecodeFailure {
                format,
                reason: format!("{e:#}"),
            })?;

        let text = normalize_text(&raw);
        if text.is_empty() {
            return Err(ExtractionError::EmptyText { format });
        }

        debug!("Extracted {} chars from {filename}", text.len());
        Ok(ExtractedText {
            text,
            source_format: format,
        })
    }
}

/// Folds decoder output into plain text: LF line endings, no NULs, ASCII
/// ligatures and spaces, trimmed.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\0' => {}
            '\u{00A0}' => out.push(' '),
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            other => out.push(other),
        }
    }
    out.trim().to_string()
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
