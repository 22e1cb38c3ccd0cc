pub mod citation;
pub mod domain;
pub mod export;
pub mod lifecycle;
pub mod memory_store;
pub mod normalizer;
pub mod orchestrator;
pub mod ports;
pub mod prompt;

pub use citation::extract_citations;
pub use domain::{
    ChatMessage, ConversationState, Document, DocumentBody, DocumentKind, InlineMedia, PageText,
    PdfPages, ResponseMode, Role, Session, UserId,
};
pub use export::{render_transcript, transcript_file_name};
pub use lifecycle::{
    AutosaveHandle, LifecycleError, LifecyclePhase, PendingTurn, RestoreOutcome,
    SessionLifecycleController, TurnTicket,
};
pub use memory_store::InMemorySessionStore;
pub use normalizer::{DocumentNormalizer, IngestError, MediaType, PageTextExtractor, MAX_UPLOAD_BYTES};
pub use orchestrator::{Answer, ConversationOrchestrator, ModelCatalog, ModelSelection, ModelTier};
pub use ports::{
    Content, GenerateRequest, GenerateResponse, GenerationConfig, GenerativeBackend, Part,
    PortError, PortResult, SessionStore,
};
