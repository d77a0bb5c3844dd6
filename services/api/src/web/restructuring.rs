//! services/api/src/web/restructuring.rs
//!
//! Routes for five-step cognitive restructuring sessions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dose_core::{Session, SessionKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{session_failure, HandlerError};
use crate::web::dto::ListQuery;
use crate::web::state::AppState;

const KIND: SessionKind = SessionKind::Restructuring;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct RestructuringSessionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    /// `in_progress` or `completed`.
    pub status: String,
    pub current_step: u8,
    pub situation_response: Option<String>,
    pub perception_response: Option<String>,
    pub affect_response: Option<String>,
    pub response_response: Option<String>,
    pub key_result_response: Option<String>,
    pub progress_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Session> for RestructuringSessionResponse {
    fn from(session: &Session) -> Self {
        let snapshot = session.to_snapshot();
        Self {
            id: snapshot.id,
            user_id: snapshot.user_id,
            status: snapshot.status,
            current_step: session.current_step(),
            situation_response: snapshot.situation_response,
            perception_response: snapshot.perception_response,
            affect_response: snapshot.affect_response,
            response_response: snapshot.response_response,
            key_result_response: snapshot.key_result_response,
            progress_percentage: session.progress_percentage(),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            completed_at: snapshot.completed_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RestructuringSessionList {
    pub sessions: Vec<RestructuringSessionResponse>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct StepResponseRequest {
    /// 1 to 5. Writing step 5 completes the session.
    pub step_number: u8,
    pub response: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Start a new restructuring session at step 1.
#[utoipa::path(
    post,
    path = "/restructuring/sessions",
    responses(
        (status = 201, description = "Session created", body = RestructuringSessionResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn create_restructuring_session(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = state
        .sessions
        .create(KIND, user_id)
        .await
        .map_err(session_failure)?;
    Ok((
        StatusCode::CREATED,
        Json(RestructuringSessionResponse::from(&session)),
    ))
}

/// List the caller's restructuring sessions, newest first.
#[utoipa::path(
    get,
    path = "/restructuring/sessions",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of sessions", body = RestructuringSessionList)
    )
)]
pub async fn list_restructuring_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let page = state
        .sessions
        .list(KIND, user_id, query.limit, query.offset)
        .await
        .map_err(session_failure)?;
    Ok(Json(RestructuringSessionList {
        sessions: page.sessions.iter().map(Into::into).collect(),
        total: page.total,
        limit: page.limit,
        offset: page.offset,
    }))
}

#[utoipa::path(
    get,
    path = "/restructuring/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "The session", body = RestructuringSessionResponse),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "No such session")
    )
)]
pub async fn get_restructuring_session(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = state
        .sessions
        .get(KIND, id, user_id)
        .await
        .map_err(session_failure)?;
    Ok(Json(RestructuringSessionResponse::from(&session)))
}

/// Answer one step. Re-sending the current step overwrites its answer.
#[utoipa::path(
    put,
    path = "/restructuring/sessions/{id}/steps",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = StepResponseRequest,
    responses(
        (status = 200, description = "Step stored", body = RestructuringSessionResponse),
        (status = 400, description = "Empty or over-long response"),
        (status = 409, description = "Step out of range or not writable now, or a concurrent update won")
    )
)]
pub async fn set_restructuring_step(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(req): Json<StepResponseRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = state
        .sessions
        .set_step_response(KIND, id, user_id, req.step_number, req.response.into())
        .await
        .map_err(session_failure)?;
    Ok(Json(RestructuringSessionResponse::from(&session)))
}

#[utoipa::path(
    post,
    path = "/restructuring/sessions/{id}/complete",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session completed", body = RestructuringSessionResponse),
        (status = 409, description = "Steps are missing or the session is already completed")
    )
)]
pub async fn complete_restructuring_session(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = state
        .sessions
        .complete_session(KIND, id, user_id)
        .await
        .map_err(session_failure)?;
    Ok(Json(RestructuringSessionResponse::from(&session)))
}

#[utoipa::path(
    delete,
    path = "/restructuring/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "No such session")
    )
)]
pub async fn delete_restructuring_session(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    state
        .sessions
        .delete(KIND, id, user_id)
        .await
        .map_err(session_failure)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dose_core::{ManualClock, SessionLimits, StepMachine};
    use chrono::TimeZone;

    #[test]
    fn response_reports_progress_and_status() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap()));
        let machine = StepMachine::new(SessionLimits::default(), clock);
        let session = machine.start(KIND, Uuid::new_v4());
        let session = machine.set_step_response(&session, 1, "Missed the bus").unwrap();
        let session = machine.set_step_response(&session, 2, "I'm always late").unwrap();

        let body = RestructuringSessionResponse::from(&session);
        assert_eq!(body.status, "in_progress");
        assert_eq!(body.current_step, 2);
        assert_eq!(body.progress_percentage, 20.0);
        assert_eq!(body.situation_response.as_deref(), Some("Missed the bus"));
        assert_eq!(body.affect_response, None);
    }
}
