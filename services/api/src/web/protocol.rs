//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the browser client and the API server.

use chrono::{DateTime, Utc};
use documind_core::{ChatMessage, ConversationState, Document, LifecyclePhase, ResponseMode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

//=========================================================================================
// Payloads Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// A question about the current document.
#[derive(Deserialize, Debug, ToSchema)]
pub struct AskRequest {
    pub question: String,
    /// `fast` (default), `pro` or `thinking`. Videos always use the heavy tier.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "fast")]
    pub mode: Option<ResponseMode>,
}

//=========================================================================================
// Payloads Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// The document summary shown in the UI. Never carries the page text or media payload.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct DocumentView {
    pub name: String,
    /// `pdf`, `image` or `video`.
    pub kind: String,
    pub total_pages: usize,
    pub mime_type: Option<String>,
    pub upload_date: DateTime<Utc>,
}

impl From<&Document> for DocumentView {
    fn from(document: &Document) -> Self {
        Self {
            name: document.name.clone(),
            kind: document.kind().as_str().to_string(),
            total_pages: document.total_pages(),
            mime_type: document.mime_type().map(str::to_string),
            upload_date: document.upload_date,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct MessageView {
    pub id: String,
    /// `user` or `model`.
    pub role: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<u32>>,
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id.clone(),
            role: message.role.as_str().to_string(),
            text: message.text.clone(),
            citations: message.citations.clone(),
            timestamp: message.timestamp,
        }
    }
}

/// The current session as seen by the client.
#[derive(Serialize, Debug, ToSchema)]
pub struct SessionView {
    /// `uninitialized`, `restoring` or `ready`.
    pub phase: String,
    pub document: Option<DocumentView>,
    pub messages: Vec<MessageView>,
}

impl SessionView {
    pub fn new(phase: LifecyclePhase, state: &ConversationState) -> Self {
        Self {
            phase: phase.as_str().to_string(),
            document: state.document.as_ref().map(DocumentView::from),
            messages: state.messages.iter().map(MessageView::from).collect(),
        }
    }
}

/// The two history entries added by one question.
#[derive(Serialize, Debug, ToSchema)]
pub struct AskResponse {
    pub question: MessageView,
    pub answer: MessageView,
    /// True when the backend failed and `answer` is an apology.
    pub backend_failed: bool,
}
