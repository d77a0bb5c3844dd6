//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI document.

use utoipa::OpenApi;

use crate::web::{auth, grounding, oauth, restructuring};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::me_handler,
        auth::logout_handler,
        auth::forgot_password_handler,
        auth::reset_password_handler,
        auth::delete_account_handler,
        oauth::oauth_login_handler,
        oauth::oauth_callback_handler,
        restructuring::create_restructuring_session,
        restructuring::list_restructuring_sessions,
        restructuring::get_restructuring_session,
        restructuring::set_restructuring_step,
        restructuring::complete_restructuring_session,
        restructuring::delete_restructuring_session,
        grounding::list_actions,
        grounding::create_grounding_session,
        grounding::list_grounding_sessions,
        grounding::get_grounding_session,
        grounding::set_check_in,
        grounding::set_acceptance,
        grounding::set_action,
        grounding::complete_action,
        grounding::complete_grounding_session,
        grounding::delete_grounding_session,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::UserResponse,
            auth::ForgotPasswordRequest,
            auth::PasswordResetResponse,
            auth::ResetPasswordRequest,
            auth::DeleteAccountRequest,
            auth::MessageResponse,
            restructuring::RestructuringSessionResponse,
            restructuring::RestructuringSessionList,
            restructuring::StepResponseRequest,
            grounding::GroundingSessionResponse,
            grounding::GroundingSessionList,
            grounding::CheckInRequest,
            grounding::AcceptanceRequest,
            grounding::ActionChoiceRequest,
            grounding::ActionCompletionRequest,
            grounding::ActionResponse,
        )
    ),
    tags(
        (name = "DOSE API", description = "Guided restructuring and grounding sessions with cookie-based auth.")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/signup",
            "/auth/forgot-password",
            "/auth/account",
            "/restructuring/sessions/{id}/steps",
            "/grounding/sessions/{id}/action/complete",
            "/grounding/actions",
            "/auth/oauth/{provider}/callback",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
