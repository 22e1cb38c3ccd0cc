//! crates/documind_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application: the normalized
//! `Document`, the `ChatMessage` history and the persisted per-user `Session`.
//! These structs are independent of any database or transport format; serde
//! derives only fix the record shape used by the session store adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// Identity
//=========================================================================================

/// Identifies the user who owns a session. Issued by the external auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

//=========================================================================================
// Document
//=========================================================================================

/// The discriminant of a `Document`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Image,
    Video,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "image",
            DocumentKind::Video => "video",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text extracted from one page of a PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

/// The ordered page texts of a PDF.
///
/// Always non-empty, and page numbers are exactly `1..=len` in order. Both
/// construction and deserialization enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PageText>", into = "Vec<PageText>")]
pub struct PdfPages(Vec<PageText>);

impl PdfPages {
    /// Numbers the given texts `1..=N`. Returns `None` for an empty input.
    pub fn from_texts<I, S>(texts: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages: Vec<PageText> = texts
            .into_iter()
            .zip(1u32..)
            .map(|(text, page)| PageText {
                page,
                text: text.into(),
            })
            .collect();
        if pages.is_empty() {
            None
        } else {
            Some(Self(pages))
        }
    }

    pub fn as_slice(&self) -> &[PageText] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<PageText>> for PdfPages {
    type Error = String;

    fn try_from(pages: Vec<PageText>) -> Result<Self, Self::Error> {
        if pages.is_empty() {
            return Err("a pdf document needs at least one page".to_string());
        }
        for (expected, page) in (1u32..).zip(&pages) {
            if page.page != expected {
                return Err(format!(
                    "pdf pages must be numbered contiguously from 1: expected {expected}, found {}",
                    page.page
                ));
            }
        }
        Ok(Self(pages))
    }
}

impl From<PdfPages> for Vec<PageText> {
    fn from(pages: PdfPages) -> Self {
        pages.0
    }
}

/// A base64 payload together with its MIME type.
///
/// The payload is reference-counted so building a backend request never copies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineMedia {
    pub mime_type: String,
    pub inline_data: Arc<str>,
}

/// Modality-specific body of a `Document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocumentBody {
    Pdf { content: PdfPages },
    Image(InlineMedia),
    Video(InlineMedia),
}

/// The canonical representation of one uploaded file.
///
/// Stored records also carry `totalPages`, derived from the body on write and
/// checked against it on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "DocumentRecord", try_from = "DocumentRecord")]
pub struct Document {
    pub name: String,
    pub upload_date: DateTime<Utc>,
    pub body: DocumentBody,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRecord {
    name: String,
    upload_date: DateTime<Utc>,
    #[serde(default)]
    total_pages: Option<usize>,
    #[serde(flatten)]
    body: DocumentBody,
}

impl From<Document> for DocumentRecord {
    fn from(document: Document) -> Self {
        Self {
            total_pages: Some(document.total_pages()),
            name: document.name,
            upload_date: document.upload_date,
            body: document.body,
        }
    }
}

impl TryFrom<DocumentRecord> for Document {
    type Error = String;

    fn try_from(record: DocumentRecord) -> Result<Self, Self::Error> {
        let document = Document {
            name: record.name,
            upload_date: record.upload_date,
            body: record.body,
        };
        match record.total_pages {
            Some(total) if total != document.total_pages() => Err(format!(
                "totalPages is {total} but the document has {} page(s)",
                document.total_pages()
            )),
            _ => Ok(document),
        }
    }
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        match self.body {
            DocumentBody::Pdf { .. } => DocumentKind::Pdf,
            DocumentBody::Image(_) => DocumentKind::Image,
            DocumentBody::Video(_) => DocumentKind::Video,
        }
    }

    /// Number of pages; media documents count as a single page.
    pub fn total_pages(&self) -> usize {
        match &self.body {
            DocumentBody::Pdf { content } => content.len(),
            DocumentBody::Image(_) | DocumentBody::Video(_) => 1,
        }
    }

    /// Page texts in page order. Empty for images and videos.
    pub fn pages(&self) -> &[PageText] {
        match &self.body {
            DocumentBody::Pdf { content } => content.as_slice(),
            DocumentBody::Image(_) | DocumentBody::Video(_) => &[],
        }
    }

    /// The binary payload. Present exactly for images and videos.
    pub fn inline_media(&self) -> Option<&InlineMedia> {
        match &self.body {
            DocumentBody::Pdf { .. } => None,
            DocumentBody::Image(media) | DocumentBody::Video(media) => Some(media),
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.inline_media().map(|media| media.mime_type.as_str())
    }
}

//=========================================================================================
// Conversation
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One turn in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    /// Ascending, duplicate-free page numbers. Only set on answers about a pdf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<u32>>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, text: String, citations: Option<Vec<u32>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text,
            citations,
            timestamp: Utc::now(),
        }
    }

    /// A question typed by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into(), None)
    }

    /// A model-role message without citations.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text.into(), None)
    }

    /// A model answer about a document of the given kind. Citations are kept
    /// only for pdf documents.
    pub fn answer(text: impl Into<String>, citations: Vec<u32>, kind: DocumentKind) -> Self {
        let citations = (kind == DocumentKind::Pdf).then_some(citations);
        Self::new(Role::Model, text.into(), citations)
    }

    /// The acknowledgment that starts every conversation about a new upload.
    pub fn upload_acknowledgment(document_name: &str) -> Self {
        Self::model(format!(
            "I have processed **{document_name}**. You can now ask questions about this document."
        ))
    }
}

/// The user-selected response-quality tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Fast,
    Pro,
    Thinking,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(ResponseMode::Fast),
            "pro" => Ok(ResponseMode::Pro),
            "thinking" => Ok(ResponseMode::Thinking),
            other => Err(format!("unknown response mode '{other}'")),
        }
    }
}

//=========================================================================================
// Session
//=========================================================================================

/// The in-memory (document, history) pair the UI and the orchestrator work on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub document: Option<Document>,
    pub messages: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn is_empty(&self) -> bool {
        self.document.is_none() && self.messages.is_empty()
    }
}

/// The persisted unit per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    pub document: Option<Document>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub last_updated: DateTime<Utc>,
}

impl Session {
    /// A full snapshot of `state` for `user_id`, stamped now.
    pub fn snapshot(user_id: UserId, state: &ConversationState) -> Self {
        Self {
            user_id,
            document: state.document.clone(),
            messages: state.messages.clone(),
            last_updated: Utc::now(),
        }
    }

    /// True when a history exists without the document that grounds it.
    pub fn is_orphaned(&self) -> bool {
        self.document.is_none() && !self.messages.is_empty()
    }

    pub fn into_state(self) -> ConversationState {
        ConversationState {
            document: self.document,
            messages: self.messages,
        }
    }
}
