pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_user;
pub use state::AppState;

/// Headroom for multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Builds the session API router. CORS and Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    let body_limit = app_state.normalizer.max_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route(
            "/session",
            get(rest::get_session_handler).delete(rest::new_chat_handler),
        )
        .route("/session/document", post(rest::upload_document_handler))
        .route(
            "/session/messages",
            post(rest::ask_handler).delete(rest::clear_messages_handler),
        )
        .route("/session/sign-out", post(rest::sign_out_handler))
        .route("/session/export", get(rest::export_handler))
        .layer(axum_middleware::from_fn(require_user))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
}
