//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes, and the helpers that read
//! and write the auth session cookie.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Duration;
use std::sync::Arc;
use tracing::{error, warn};

use crate::web::state::AppState;

const SESSION_COOKIE: &str = "session";

/// Middleware that validates the auth session cookie and extracts the user_id.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If invalid, revoked or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Parse session ID from the cookie header
    let auth_session_id = auth_session_id(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    // 2. Reject ids revoked by logout
    let revoked = state
        .credentials
        .is_blacklisted(&auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to check the token blacklist: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if revoked {
        warn!("Rejected a revoked auth session");
        return Err(StatusCode::UNAUTHORIZED);
    }

    // 3. Validate auth session in database, get user_id
    let user_id = state
        .auth_sessions
        .validate_auth_session(&auth_session_id, state.clock.now())
        .await
        .map_err(|e| {
            error!("Failed to validate auth session: {:?}", e);
            StatusCode::UNAUTHORIZED
        })?;

    // 4. Insert user_id into request extensions
    req.extensions_mut().insert(user_id);

    // 5. Continue to the handler
    Ok(next.run(req).await)
}

/// Reads the auth session id from the `Cookie` header.
pub fn auth_session_id(headers: &HeaderMap) -> Option<&str> {
    cookie_value(headers, SESSION_COOKIE)
}

/// The non-empty value of cookie `wanted`, if the request carries one.
pub fn cookie_value<'a>(headers: &'a HeaderMap, wanted: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == wanted && !value.is_empty()).then_some(value)
        })
}

pub fn session_cookie(auth_session_id: &str, ttl: Duration) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        auth_session_id,
        ttl.num_seconds()
    )
}

pub fn clear_session_cookie() -> String {
    format!("{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}
