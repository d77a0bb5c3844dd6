//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: signup, login, logout, the current user, password
//! reset and account deletion.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use dose_core::{Email, NewUser, PortError, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{credential_failure, internal, HandlerError};
use crate::web::middleware::{auth_session_id, clear_session_cookie, session_cookie};
use crate::web::state::AppState;

pub const MIN_PASSWORD_LENGTH: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            is_verified: user.is_verified,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct PasswordResetResponse {
    pub message: String,
    /// Only present when the server runs with `EXPOSE_RESET_TOKEN=true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

//=========================================================================================
// Password Hashing
//=========================================================================================

pub fn hash_password(password: &str) -> Result<String, HandlerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            internal("Failed to hash password")
        })
}

/// `false` for a wrong password and for accounts that have none (OAuth only).
pub fn verify_password(password: &str, stored: Option<&str>) -> Result<bool, HandlerError> {
    let Some(stored) = stored else {
        return Ok(false);
    };
    let parsed_hash = PasswordHash::new(stored).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        internal("Authentication error")
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn parse_email(raw: &str) -> Result<Email, HandlerError> {
    Email::parse(raw).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

fn check_password_strength(password: &str) -> Result<(), HandlerError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }
    Ok(())
}

/// Creates an auth session for `user_id` and returns its cookie.
pub(crate) async fn start_auth_session(state: &AppState, user_id: Uuid) -> Result<String, HandlerError> {
    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = state.config.auth_session_ttl;
    let expires_at = state.clock.now() + ttl;

    state
        .auth_sessions
        .create_auth_session(&auth_session_id, user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            internal("Failed to create session")
        })?;

    Ok(session_cookie(&auth_session_id, ttl))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid email or weak password"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    // 1. Validate input
    let email = parse_email(&req.email)?;
    check_password_strength(&req.password)?;

    // 2. Hash the password
    let password_hash = hash_password(&req.password)?;

    // 3. Create user in database
    let user = state
        .users
        .create_user(NewUser {
            email,
            hashed_password: Some(password_hash),
            full_name: req.full_name.filter(|name| !name.trim().is_empty()),
            is_verified: false,
        })
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => (StatusCode::CONFLICT, "Email already registered".to_string()),
            other => {
                error!("Failed to create user: {:?}", other);
                internal("Failed to create user")
            }
        })?;
    info!(user_id = %user.user_id, "User signed up");

    // 4. Create the auth session and its cookie
    let cookie = start_auth_session(&state, user.user_id).await?;

    // 5. Return response with cookie
    let response = AuthResponse {
        user_id: user.user_id,
        email: user.email,
    };
    Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let rejected = || (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string());

    // 1. Get user by email
    let email = Email::parse(&req.email).map_err(|_| rejected())?;
    let user_creds = state
        .users
        .get_user_by_email(&email)
        .await
        .map_err(|e| {
            error!("Failed to get user: {:?}", e);
            internal("Authentication error")
        })?
        .ok_or_else(rejected)?;

    // 2. Verify password
    if !verify_password(&req.password, user_creds.hashed_password.as_deref())? {
        warn!(user_id = %user_creds.user_id, "Failed login attempt");
        return Err(rejected());
    }
    if !user_creds.is_active {
        return Err((StatusCode::UNAUTHORIZED, "Account is deactivated".to_string()));
    }

    // 3. Create the auth session and its cookie
    let cookie = start_auth_session(&state, user_creds.user_id).await?;
    info!(user_id = %user_creds.user_id, "User logged in");

    // 4. Return response with cookie
    let response = AuthResponse {
        user_id: user_creds.user_id,
        email: user_creds.email,
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// GET /auth/me - The signed-in user
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let user = state
        .users
        .get_user_by_id(user_id)
        .await
        .map_err(|e| {
            error!("Failed to get user: {:?}", e);
            internal("Failed to load user")
        })?
        .ok_or((StatusCode::UNAUTHORIZED, "User no longer exists".to_string()))?;
    Ok(Json(UserResponse::from(user)))
}

/// POST /auth/logout - Logout and revoke the session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    // 1. Parse session ID from cookie
    let auth_session_id = auth_session_id(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    // 2. Look up the stored session for its natural expiry
    let auth_session = state
        .auth_sessions
        .get_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to load auth session: {:?}", e);
            internal("Failed to logout")
        })?;

    // 3. Revoke it until then
    if let Some(auth_session) = auth_session {
        state
            .credentials
            .blacklist(&auth_session.id, auth_session.user_id, auth_session.expires_at)
            .await
            .map_err(credential_failure)?;
        info!(user_id = %auth_session.user_id, "User logged out");
    }

    // 4. Clear cookie
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        MessageResponse::new("Logged out"),
    ))
}

/// POST /auth/forgot-password - Request a password reset token
///
/// The response is the same whether or not the email is registered.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset requested", body = PasswordResetResponse),
        (status = 400, description = "Malformed email")
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let email = parse_email(&req.email)?;

    let user = state.users.get_user_by_email(&email).await.map_err(|e| {
        error!("Failed to get user: {:?}", e);
        internal("Failed to request password reset")
    })?;

    let mut reset_token = None;
    if let Some(user) = user.filter(|u| u.is_active) {
        let (raw, _) = state
            .credentials
            .issue_reset_token(user.user_id)
            .await
            .map_err(credential_failure)?;
        if state.config.expose_reset_token {
            reset_token = Some(raw);
        }
    }

    Ok(Json(PasswordResetResponse {
        message: "If the email is registered, a password reset link has been sent".to_string(),
        reset_token,
    }))
}

/// The reset token was redeemed but the new hash was not stored.
fn password_update_failure(user_id: Uuid, err: PortError) -> HandlerError {
    error!(
        user_id = %user_id,
        "Reset token redeemed but the password update failed; a new reset is required: {:?}",
        err
    );
    internal("Failed to reset password. Please request a new reset link")
}

/// POST /auth/reset-password - Set a new password with a reset token
///
/// The token is single use. If storing the new password fails after the token
/// was redeemed, the old password stays valid and the user has to request a
/// new reset token.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired token, or weak password"),
        (status = 500, description = "Password not stored; request a new reset token")
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    // 1. Validate the new password before the token is spent
    check_password_strength(&req.new_password)?;
    let password_hash = hash_password(&req.new_password)?;

    // 2. Consume the token
    let user_id = state
        .credentials
        .redeem_reset_token(&req.token)
        .await
        .map_err(credential_failure)?;

    // 3. Store the new hash. The token is already spent, so a failure here
    //    leaves the old password in place until a new reset is requested.
    state
        .users
        .update_password(user_id, &password_hash)
        .await
        .map_err(|e| password_update_failure(user_id, e))?;
    info!(user_id = %user_id, "Password reset");

    Ok(MessageResponse::new("Password has been reset"))
}

/// DELETE /auth/account - Delete the signed-in account and everything it owns
#[utoipa::path(
    delete,
    path = "/auth/account",
    request_body = DeleteAccountRequest,
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 401, description = "Wrong password or not signed in")
    )
)]
pub async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<DeleteAccountRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    // 1. Confirm the password
    let user = state
        .users
        .get_user_by_id(user_id)
        .await
        .map_err(|e| {
            error!("Failed to get user: {:?}", e);
            internal("Failed to delete account")
        })?
        .ok_or((StatusCode::UNAUTHORIZED, "User no longer exists".to_string()))?;
    let email = parse_email(&user.email)?;
    let stored_hash = state
        .users
        .get_user_by_email(&email)
        .await
        .map_err(|e| {
            error!("Failed to get user credentials: {:?}", e);
            internal("Failed to delete account")
        })?
        .and_then(|creds| creds.hashed_password);
    if !verify_password(&req.password, stored_hash.as_deref())? {
        return Err((StatusCode::UNAUTHORIZED, "Invalid password".to_string()));
    }

    // 2. Delete; sessions and tokens cascade in storage
    state.users.delete_user(user_id).await.map_err(|e| {
        error!("Failed to delete user: {:?}", e);
        internal("Failed to delete account")
    })?;
    info!(user_id = %user_id, "Account deleted");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        MessageResponse::new("Account deleted"),
    ))
}
