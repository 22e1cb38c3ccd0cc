//! crates/documind_core/src/normalizer.rs
//!
//! Turns a raw uploaded file into the canonical `Document`.
//!
//! Validation (declared MIME type, size) always happens before any parsing.
//! PDFs become page texts numbered `1..=N`; images and videos become a base64
//! payload. Normalization is a pure transform and never touches session state.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{Document, DocumentBody, DocumentKind, InlineMedia, PdfPages};

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("Unsupported file type '{0}'. Upload a PDF, an image (JPEG, PNG, WEBP) or a video (MP4, MPEG, MOV, WEBM).")]
    InvalidFileType(String),
    #[error("File size of {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },
    #[error("Failed to extract text from the document: {0}")]
    ExtractionFailed(String),
}

//=========================================================================================
// Accepted media types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Pdf,
    Jpeg,
    Png,
    Webp,
    Mp4,
    Mpeg,
    QuickTime,
    Webm,
}

impl MediaType {
    pub const ALL: [MediaType; 8] = [
        MediaType::Pdf,
        MediaType::Jpeg,
        MediaType::Png,
        MediaType::Webp,
        MediaType::Mp4,
        MediaType::Mpeg,
        MediaType::QuickTime,
        MediaType::Webm,
    ];

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Webp => "image/webp",
            MediaType::Mp4 => "video/mp4",
            MediaType::Mpeg => "video/mpeg",
            MediaType::QuickTime => "video/quicktime",
            MediaType::Webm => "video/webm",
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            MediaType::Pdf => DocumentKind::Pdf,
            MediaType::Jpeg | MediaType::Png | MediaType::Webp => DocumentKind::Image,
            MediaType::Mp4 | MediaType::Mpeg | MediaType::QuickTime | MediaType::Webm => {
                DocumentKind::Video
            }
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl FromStr for MediaType {
    type Err = IngestError;

    /// Matches the essence of a MIME type (`type/subtype`), ignoring case and parameters.
    fn from_str(declared: &str) -> Result<Self, Self::Err> {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        MediaType::ALL
            .into_iter()
            .find(|media| media.mime() == essence)
            .ok_or_else(|| IngestError::InvalidFileType(declared.to_string()))
    }
}

//=========================================================================================
// PDF text extraction
//=========================================================================================

/// Extracts the text of every page of a PDF.
pub trait PageTextExtractor: Send + Sync {
    /// Returns exactly one entry per page, in page order. A page without
    /// extractable text yields an empty string rather than being skipped.
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, IngestError>;
}

/// PDF text extractor backed by `lopdf`. Handles digital PDFs with embedded text layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfTextExtractor;

impl PageTextExtractor for LopdfTextExtractor {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, IngestError> {
        let pdf = lopdf::Document::load_mem(pdf_bytes)
            .map_err(|e| IngestError::ExtractionFailed(e.to_string()))?;

        let pages = pdf
            .get_pages()
            .into_keys()
            .map(|number| match pdf.extract_text(&[number]) {
                Ok(text) => collapse_whitespace(&text),
                Err(e) => {
                    debug!(page = number, error = %e, "No extractable text on page");
                    String::new()
                }
            })
            .collect();

        Ok(pages)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

//=========================================================================================
// The normalizer
//=========================================================================================

pub struct DocumentNormalizer<E = LopdfTextExtractor> {
    extractor: E,
    max_bytes: usize,
}

impl DocumentNormalizer {
    pub fn new() -> Self {
        Self::with_extractor(LopdfTextExtractor)
    }
}

impl Default for DocumentNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PageTextExtractor> DocumentNormalizer<E> {
    pub fn with_extractor(extractor: E) -> Self {
        Self {
            extractor,
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Checks the declared type, then the size. Cheap; run it at the upload boundary.
    pub fn validate(&self, declared_mime: &str, size: usize) -> Result<MediaType, IngestError> {
        let media = declared_mime.parse::<MediaType>()?;
        if size > self.max_bytes {
            return Err(IngestError::FileTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(media)
    }

    /// Builds a `Document` from an uploaded file. Nothing partial is ever returned.
    pub fn normalize(
        &self,
        name: &str,
        declared_mime: &str,
        bytes: &[u8],
    ) -> Result<Document, IngestError> {
        let media = self.validate(declared_mime, bytes.len())?;

        let body = match media.kind() {
            DocumentKind::Pdf => {
                let texts = self.extractor.extract_pages(bytes)?;
                let content = PdfPages::from_texts(texts).ok_or_else(|| {
                    IngestError::ExtractionFailed("the PDF has no pages".to_string())
                })?;
                DocumentBody::Pdf { content }
            }
            DocumentKind::Image => DocumentBody::Image(encode_media(media, bytes)),
            DocumentKind::Video => DocumentBody::Video(encode_media(media, bytes)),
        };

        let document = Document {
            name: name.to_string(),
            upload_date: Utc::now(),
            body,
        };
        debug!(
            name = %document.name,
            kind = %document.kind(),
            pages = document.total_pages(),
            "Normalized upload"
        );
        Ok(document)
    }
}

fn encode_media(media: MediaType, bytes: &[u8]) -> InlineMedia {
    InlineMedia {
        mime_type: media.mime().to_string(),
        inline_data: Arc::from(STANDARD.encode(bytes)),
    }
}
