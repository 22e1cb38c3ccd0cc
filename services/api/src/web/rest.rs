//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the session endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::protocol::{AskRequest, AskResponse, DocumentView, MessageView, SessionView};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use documind_core::{
    render_transcript, transcript_file_name, ChatMessage, IngestError, LifecycleError,
    SessionStore, UserId,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::OpenApi;

/// Shown in place of an answer when the backend call fails.
pub const BACKEND_APOLOGY: &str =
    "I encountered an error while processing your request. Please try again in a moment.";

type HandlerError = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_session_handler,
        upload_document_handler,
        ask_handler,
        clear_messages_handler,
        new_chat_handler,
        sign_out_handler,
        export_handler,
    ),
    components(
        schemas(SessionView, DocumentView, MessageView, AskRequest, AskResponse)
    ),
    tags(
        (name = "DocuMind API", description = "Chat with an uploaded PDF, image or video.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

fn lifecycle_error(e: LifecycleError) -> HandlerError {
    let status = match e {
        LifecycleError::NotReady(_)
        | LifecycleError::NoDocument
        | LifecycleError::ConversationChanged => StatusCode::CONFLICT,
        LifecycleError::NoIdentity => StatusCode::UNAUTHORIZED,
    };
    (status, e.to_string())
}

fn ingest_error(e: IngestError) -> HandlerError {
    let status = match e {
        IngestError::InvalidFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        IngestError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        IngestError::ExtractionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, e.to_string())
}

fn no_document() -> HandlerError {
    lifecycle_error(LifecycleError::NoDocument)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Get the current session, restoring it from storage on first access.
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "The current session", body = SessionView),
        (status = 401, description = "Missing x-user-id header")
    ),
    params(("x-user-id" = String, Header, description = "The signed-in user's id."))
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
) -> Json<SessionView> {
    let controller = app_state.session(&user_id).await;
    Json(SessionView::new(controller.phase(), &controller.snapshot()))
}

/// Upload a document, replacing the current one and resetting the chat.
///
/// Accepts a multipart/form-data request with a single file part. The part's
/// content type decides how the file is processed.
#[utoipa::path(
    post,
    path = "/session/document",
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 201, description = "Document processed", body = SessionView),
        (status = 400, description = "Missing file part"),
        (status = 409, description = "Session is still restoring"),
        (status = 413, description = "File exceeds the upload limit"),
        (status = 415, description = "Unsupported file type"),
        (status = 422, description = "PDF text could not be extracted")
    ),
    params(("x-user-id" = String, Header, description = "The signed-in user's id."))
)]
pub async fn upload_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| (e.status(), e.body_text()))?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Multipart form must include a file".to_string(),
            )
        })?;

    let file_name = field.file_name().unwrap_or("untitled").to_string();
    let declared_mime = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = field.bytes().await.map_err(|e| (e.status(), e.body_text()))?;

    let normalizer = Arc::clone(&app_state.normalizer);
    let name = file_name.clone();
    let document = tokio::task::spawn_blocking(move || normalizer.normalize(&name, &declared_mime, &data))
        .await
        .map_err(|e| {
            error!("Document normalization task failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process the document".to_string(),
            )
        })?
        .map_err(|e| {
            warn!(user_id = %user_id, file = %file_name, error = %e, "Upload rejected");
            ingest_error(e)
        })?;

    let controller = app_state.session(&user_id).await;
    controller
        .replace_document(document)
        .map_err(lifecycle_error)?;
    info!(user_id = %user_id, file = %file_name, "Document uploaded");

    Ok((
        StatusCode::CREATED,
        Json(SessionView::new(controller.phase(), &controller.snapshot())),
    ))
}

/// Ask a question about the current document.
///
/// A backend failure does not fail the request: an apology is recorded as the answer.
/// If the chat is reset or the document replaced before the answer arrives, the
/// answer is dropped and 409 is returned.
#[utoipa::path(
    post,
    path = "/session/messages",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Question and answer appended", body = AskResponse),
        (status = 400, description = "Empty question"),
        (status = 409, description = "No document, session not ready, or conversation changed")
    ),
    params(("x-user-id" = String, Header, description = "The signed-in user's id."))
)]
pub async fn ask_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, HandlerError> {
    let question_text = request.question.trim();
    if question_text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question must not be empty".to_string()));
    }

    let controller = app_state.session(&user_id).await;
    let question = ChatMessage::user(question_text);
    let turn = controller
        .begin_turn(question.clone())
        .map_err(lifecycle_error)?;

    let mode = request.mode.unwrap_or_default();
    let (answer, backend_failed) = match app_state
        .orchestrator
        .answer(&turn.document, &turn.history, question_text, mode)
        .await
    {
        Ok(answer) => (answer.into_message(turn.document.kind()), false),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Answering failed; recording an apology");
            (ChatMessage::model(BACKEND_APOLOGY), true)
        }
    };

    controller
        .finish_turn(turn.ticket, answer.clone())
        .map_err(|e| {
            info!(user_id = %user_id, error = %e, "Dropping answer for a replaced conversation");
            lifecycle_error(e)
        })?;

    Ok(Json(AskResponse {
        question: MessageView::from(&question),
        answer: MessageView::from(&answer),
        backend_failed,
    }))
}

/// Clear the chat history but keep the document.
#[utoipa::path(
    delete,
    path = "/session/messages",
    responses(
        (status = 204, description = "History cleared"),
        (status = 409, description = "Session not ready")
    ),
    params(("x-user-id" = String, Header, description = "The signed-in user's id."))
)]
pub async fn clear_messages_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
) -> Result<StatusCode, HandlerError> {
    let controller = app_state.session(&user_id).await;
    controller.clear_messages().map_err(lifecycle_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start a new chat: forget the document and history, including the stored copy.
#[utoipa::path(
    delete,
    path = "/session",
    responses((status = 204, description = "Session reset")),
    params(("x-user-id" = String, Header, description = "The signed-in user's id."))
)]
pub async fn new_chat_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
) -> Result<StatusCode, HandlerError> {
    let controller = app_state.session(&user_id).await;
    controller.new_chat().await.map_err(lifecycle_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Clear the user's stored session as part of logging out.
#[utoipa::path(
    post,
    path = "/session/sign-out",
    responses((status = 204, description = "Session cleared")),
    params(("x-user-id" = String, Header, description = "The signed-in user's id."))
)]
pub async fn sign_out_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
) -> Result<StatusCode, HandlerError> {
    match app_state.sessions.detach(&user_id) {
        Some(controller) => controller.sign_out().await.map_err(lifecycle_error)?,
        None => {
            if let Err(e) = app_state.store.delete(&user_id).await {
                warn!(user_id = %user_id, error = %e, "Failed to clear session on sign-out");
            }
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Download the chat history as a plain-text transcript.
#[utoipa::path(
    get,
    path = "/session/export",
    responses(
        (status = 200, description = "Transcript", content_type = "text/plain", body = String),
        (status = 404, description = "No messages to export"),
        (status = 409, description = "No document")
    ),
    params(("x-user-id" = String, Header, description = "The signed-in user's id."))
)]
pub async fn export_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
) -> Result<impl IntoResponse, HandlerError> {
    let controller = app_state.session(&user_id).await;
    let state = controller.snapshot();
    let document = state.document.ok_or_else(no_document)?;

    let transcript = render_transcript(&document, &state.messages, Utc::now()).ok_or_else(|| {
        (StatusCode::NOT_FOUND, "There are no messages to export".to_string())
    })?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        transcript_file_name(&document).replace('"', "")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        transcript,
    ))
}
