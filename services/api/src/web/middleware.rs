//! services/api/src/web/middleware.rs
//!
//! Identity middleware for the session routes.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use documind_core::UserId;

/// Header carrying the signed-in user's id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Reads the user id header into the request extensions.
///
/// If missing or blank, returns 401 Unauthorized.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = user_from_headers(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

fn user_from_headers(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(UserId::from)
}
