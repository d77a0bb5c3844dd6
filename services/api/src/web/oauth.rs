//! services/api/src/web/oauth.rs
//!
//! Social sign-in. `login` sends the browser to the provider with a random
//! `state` kept in a short-lived cookie; `callback` checks that state, exchanges
//! the code, links or creates the local user and starts an auth session.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect},
};
use dose_core::{OAuthProvider, OAuthProviderKind, OsTokenSource, TokenSource};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::IntoParams;

use crate::config::Config;
use crate::error::{account_failure, HandlerError};
use crate::web::auth::start_auth_session;
use crate::web::middleware::cookie_value;
use crate::web::state::AppState;

const STATE_COOKIE: &str = "oauth_state";
const STATE_COOKIE_MAX_AGE_SECS: i64 = 600;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user declines.
    pub error: Option<String>,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// The callback URL registered with each provider.
pub fn redirect_uri(config: &Config, kind: OAuthProviderKind) -> String {
    format!("{}/auth/oauth/{}/callback", config.oauth_redirect_base, kind)
}

fn state_cookie(value: &str) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/auth/oauth; Max-Age={}",
        STATE_COOKIE, value, STATE_COOKIE_MAX_AGE_SECS
    )
}

fn clear_state_cookie() -> String {
    format!("{}=; HttpOnly; Secure; SameSite=Lax; Path=/auth/oauth; Max-Age=0", STATE_COOKIE)
}

fn provider_for(state: &AppState, raw: &str) -> Result<Arc<dyn OAuthProvider>, HandlerError> {
    let kind = raw
        .parse::<OAuthProviderKind>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    state.oauth_providers.get(&kind).cloned().ok_or((
        StatusCode::NOT_FOUND,
        format!("OAuth provider {} is not configured", kind),
    ))
}

/// The `state` echoed by the provider must match the cookie set at login.
fn check_state(headers: &HeaderMap, returned: Option<&str>) -> Result<(), HandlerError> {
    match (cookie_value(headers, STATE_COOKIE), returned) {
        (Some(expected), Some(returned)) if expected == returned => Ok(()),
        _ => Err((StatusCode::BAD_REQUEST, "OAuth state mismatch".to_string())),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /auth/oauth/{provider}/login - Redirect to the provider's consent page
#[utoipa::path(
    get,
    path = "/auth/oauth/{provider}/login",
    params(("provider" = String, Path, description = "google, github or linkedin")),
    responses(
        (status = 303, description = "Redirect to the provider"),
        (status = 400, description = "Unsupported provider"),
        (status = 404, description = "Provider not configured")
    )
)]
pub async fn oauth_login_handler(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    // 1. Resolve the provider
    let provider = provider_for(&state, &provider)?;

    // 2. Build the consent URL with a fresh state value
    let nonce = OsTokenSource.generate();
    let url = provider
        .authorize_url(&redirect_uri(&state.config, provider.kind()), &nonce)
        .map_err(|e| {
            error!("Failed to build authorize URL: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start sign-in".to_string())
        })?;
    info!(provider = %provider.kind(), "Starting OAuth sign-in");

    // 3. Remember the state and redirect
    Ok(([(header::SET_COOKIE, state_cookie(&nonce))], Redirect::to(&url)))
}

/// GET /auth/oauth/{provider}/callback - Finish sign-in and start a session
#[utoipa::path(
    get,
    path = "/auth/oauth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "google, github or linkedin"),
        OAuthCallbackQuery
    ),
    responses(
        (status = 303, description = "Signed in; redirect to the frontend"),
        (status = 400, description = "Unsupported provider, missing code or state mismatch"),
        (status = 401, description = "Sign-in refused by the provider or account deactivated"),
        (status = 404, description = "Provider not configured")
    )
)]
pub async fn oauth_callback_handler(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    // 1. Resolve the provider and reject refusals
    let provider = provider_for(&state, &provider)?;
    if let Some(reason) = query.error {
        warn!(provider = %provider.kind(), reason = %reason, "OAuth sign-in refused");
        return Err((StatusCode::UNAUTHORIZED, "Sign-in was refused".to_string()));
    }

    // 2. Check the state and the code
    check_state(&headers, query.state.as_deref())?;
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Missing authorization code".to_string()))?;

    // 3. Exchange the code and resolve the local user
    let (user, outcome) = state
        .accounts
        .sign_in_with_code(
            provider.as_ref(),
            &code,
            &redirect_uri(&state.config, provider.kind()),
        )
        .await
        .map_err(account_failure)?;
    info!(user_id = %user.user_id, provider = %provider.kind(), outcome = ?outcome, "OAuth sign-in");

    // 4. Start the auth session and hand the browser back to the frontend
    let cookie = start_auth_session(&state, user.user_id).await?;
    Ok((
        AppendHeaders([
            (header::SET_COOKIE, cookie),
            (header::SET_COOKIE, clear_state_cookie()),
        ]),
        Redirect::to(&state.config.oauth_success_redirect),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn callback_url_is_built_from_the_public_base() {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://db/dose".to_string()),
            "OAUTH_REDIRECT_BASE_URL" => Some("https://dose.example".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(
            redirect_uri(&config, OAuthProviderKind::Github),
            "https://dose.example/auth/oauth/github/callback"
        );
    }

    #[test]
    fn state_must_match_the_login_cookie() {
        let headers = with_cookie("session=abc; oauth_state=n0nce");
        assert!(check_state(&headers, Some("n0nce")).is_ok());

        let (status, _) = check_state(&headers, Some("forged")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(check_state(&headers, None).is_err());
        assert!(check_state(&HeaderMap::new(), Some("n0nce")).is_err());
    }

    #[test]
    fn state_cookie_is_scoped_and_short_lived() {
        let cookie = state_cookie("n0nce");
        assert!(cookie.starts_with("oauth_state=n0nce;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/auth/oauth"));
        assert!(cookie.ends_with("Max-Age=600"));
        assert!(clear_state_cookie().ends_with("Max-Age=0"));
    }
}
