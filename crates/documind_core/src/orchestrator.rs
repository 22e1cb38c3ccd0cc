//! crates/documind_core/src/orchestrator.rs
//!
//! Builds one backend request per question, invokes the backend and turns the
//! reply into an `Answer`.
//!
//! The request shape depends only on the document kind:
//! - pdf: the whole document goes in as a `[Page N]`-marked context turn, then the
//!   history, then the question.
//! - image/video: the payload travels exactly once. Without history it shares a
//!   turn with the question; with history it opens a priming pair (payload turn +
//!   synthetic acknowledgment) ahead of the replayed history.
//!
//! The orchestrator keeps no state between calls and performs no retries.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::citation::extract_citations;
use crate::domain::{ChatMessage, Document, DocumentKind, ResponseMode, Role};
use crate::ports::{
    Content, GenerateRequest, GenerationConfig, GenerativeBackend, Part, PortResult,
};
use crate::prompt;

//=========================================================================================
// Model selection
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Light, low-latency model.
    Fast,
    /// Heavy model; required for video.
    Pro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSelection {
    pub tier: ModelTier,
    /// Set only for `thinking` mode on pdf/image documents.
    pub thinking_budget: Option<u32>,
}

/// Maps tiers to concrete backend model names.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
    pub fast_model: String,
    pub pro_model: String,
    /// Must be non-zero.
    pub thinking_budget: u32,
    pub temperature: Option<f32>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            fast_model: "gemini-2.5-flash-lite".to_string(),
            pro_model: "gemini-3-pro-preview".to_string(),
            thinking_budget: 32_768,
            temperature: None,
        }
    }
}

impl ModelCatalog {
    /// Pick the tier for a call. Evaluated on every call; video ignores `mode`.
    pub fn select(&self, kind: DocumentKind, mode: ResponseMode) -> ModelSelection {
        match (kind, mode) {
            (DocumentKind::Video, _) => ModelSelection {
                tier: ModelTier::Pro,
                thinking_budget: None,
            },
            (_, ResponseMode::Fast) => ModelSelection {
                tier: ModelTier::Fast,
                thinking_budget: None,
            },
            (_, ResponseMode::Pro) => ModelSelection {
                tier: ModelTier::Pro,
                thinking_budget: None,
            },
            (_, ResponseMode::Thinking) => ModelSelection {
                tier: ModelTier::Pro,
                thinking_budget: Some(self.thinking_budget),
            },
        }
    }

    pub fn model_name(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Pro => &self.pro_model,
        }
    }
}

//=========================================================================================
// Request building
//=========================================================================================

/// Lay out the conversation turns for `question` against `document`.
pub fn build_contents(document: &Document, history: &[ChatMessage], question: &str) -> Vec<Content> {
    match document.inline_media() {
        None => pdf_contents(document, history, question),
        Some(media) => {
            let payload = Part::InlineData {
                mime_type: media.mime_type.clone(),
                data: Arc::clone(&media.inline_data),
            };
            media_contents(document.kind(), payload, history, question)
        }
    }
}

fn pdf_contents(document: &Document, history: &[ChatMessage], question: &str) -> Vec<Content> {
    let mut contents = Vec::with_capacity(history.len() + 2);
    contents.push(Content::text(
        Role::User,
        prompt::pdf_context_block(document.pages()),
    ));
    contents.extend(replay(history));
    contents.push(Content::text(Role::User, question));
    contents
}

fn media_contents(
    kind: DocumentKind,
    payload: Part,
    history: &[ChatMessage],
    question: &str,
) -> Vec<Content> {
    if history.is_empty() {
        return vec![Content {
            role: Role::User,
            parts: vec![payload, Part::text(question)],
        }];
    }

    let mut contents = Vec::with_capacity(history.len() + 3);
    contents.push(Content {
        role: Role::User,
        parts: vec![payload, Part::text(prompt::media_reference_note(kind))],
    });
    contents.push(Content::text(Role::Model, prompt::media_acknowledgment(kind)));
    contents.extend(replay(history));
    contents.push(Content::text(Role::User, question));
    contents
}

fn replay(history: &[ChatMessage]) -> impl Iterator<Item = Content> + '_ {
    history
        .iter()
        .map(|message| Content::text(message.role, message.text.as_str()))
}

/// Assemble the complete backend request for one question.
pub fn build_request(
    catalog: &ModelCatalog,
    document: &Document,
    history: &[ChatMessage],
    question: &str,
    mode: ResponseMode,
) -> GenerateRequest {
    let kind = document.kind();
    let selection = catalog.select(kind, mode);
    GenerateRequest {
        model: catalog.model_name(selection.tier).to_string(),
        contents: build_contents(document, history, question),
        system_instruction: prompt::system_instruction(kind).to_string(),
        config: GenerationConfig {
            temperature: catalog.temperature,
            thinking_budget: selection.thinking_budget,
        },
    }
}

//=========================================================================================
// The orchestrator
//=========================================================================================

/// The parsed reply to one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// Ascending cited pages; always empty for images and videos.
    pub citations: Vec<u32>,
    pub model: String,
}

impl Answer {
    /// The history entry for this answer.
    pub fn into_message(self, kind: DocumentKind) -> ChatMessage {
        ChatMessage::answer(self.text, self.citations, kind)
    }
}

#[derive(Clone)]
pub struct ConversationOrchestrator {
    backend: Arc<dyn GenerativeBackend>,
    catalog: ModelCatalog,
}

impl ConversationOrchestrator {
    pub fn new(backend: Arc<dyn GenerativeBackend>, catalog: ModelCatalog) -> Self {
        Self { backend, catalog }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Answer `question` about `document`, given the prior `history`.
    ///
    /// `history` must not contain the new question. Backend failures are
    /// returned unmodified.
    pub async fn answer(
        &self,
        document: &Document,
        history: &[ChatMessage],
        question: &str,
        mode: ResponseMode,
    ) -> PortResult<Answer> {
        let kind = document.kind();
        let request = build_request(&self.catalog, document, history, question, mode);
        let model = request.model.clone();

        debug!(
            model = %model,
            kind = %kind,
            ?mode,
            turns = request.contents.len(),
            thinking_budget = ?request.config.thinking_budget,
            "Sending question to backend"
        );

        let response = self.backend.generate(request).await.map_err(|e| {
            warn!(model = %model, error = %e, "Backend call failed");
            e
        })?;

        let text = response
            .text
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| prompt::EMPTY_REPLY_PLACEHOLDER.to_string());

        let citations = match kind {
            DocumentKind::Pdf => extract_citations(&text),
            DocumentKind::Image | DocumentKind::Video => Vec::new(),
        };

        Ok(Answer {
            text,
            citations,
            model,
        })
    }
}
