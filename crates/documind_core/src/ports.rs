//! crates/documind_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the durable session store and of the generative backend.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Role, Session, UserId};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The collaborator could not be reached (transport failure or timeout).
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    /// The collaborator is refusing requests because a quota was exhausted.
    #[error("Rate limited by upstream service")]
    RateLimited,
    /// The collaborator answered, but with an error.
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Session Store Port
//=========================================================================================

/// Durable key-value storage of one `Session` per user.
///
/// `put` always receives a full snapshot; implementations upsert by `session.user_id`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns `Ok(None)` when nothing is stored for `user_id`.
    async fn get(&self, user_id: &UserId) -> PortResult<Option<Session>>;

    async fn put(&self, session: &Session) -> PortResult<()>;

    /// Deleting a missing record is not an error.
    async fn delete(&self, user_id: &UserId) -> PortResult<()>;
}

//=========================================================================================
// Generative Backend Port
//=========================================================================================

/// One piece of a conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// A base64 payload shared with the `Document` it came from.
    InlineData { mime_type: String, data: Arc<str> },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::InlineData { .. } => None,
        }
    }

    pub fn is_inline_data(&self) -> bool {
        matches!(self, Part::InlineData { .. })
    }
}

/// One turn of the conversation sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    /// Extended-reasoning budget in tokens. Only set in `thinking` mode.
    pub thinking_budget: Option<u32>,
}

/// Everything the backend needs to produce one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub contents: Vec<Content>,
    pub system_instruction: String,
    pub config: GenerationConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    /// `None` or empty when the backend produced no text.
    pub text: Option<String>,
}

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Produces one reply. Failures are opaque to the core and returned as-is.
    async fn generate(&self, request: GenerateRequest) -> PortResult<GenerateResponse>;
}
