//! services/api/src/web/grounding.rs
//!
//! Routes for four-step emotional grounding sessions and the quick-action
//! catalog.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dose_core::{ActionInput, ActionType, Session, SessionKind, StepInput};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{session_failure, HandlerError};
use crate::web::dto::ListQuery;
use crate::web::state::AppState;

const KIND: SessionKind = SessionKind::Grounding;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct GroundingSessionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    /// `in_progress` or `completed`.
    pub status: String,
    pub current_step: u8,
    pub situation: Option<String>,
    pub emotion: Option<String>,
    pub intensity: Option<i32>,
    pub acceptance_statement: Option<String>,
    pub action_type: Option<String>,
    pub action_completed: bool,
    /// Seconds.
    pub actual_duration: Option<i64>,
    pub action_notes: Option<String>,
    pub progress_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Session> for GroundingSessionResponse {
    fn from(session: &Session) -> Self {
        let snapshot = session.to_snapshot();
        Self {
            id: snapshot.id,
            user_id: snapshot.user_id,
            status: snapshot.status,
            current_step: session.current_step(),
            situation: snapshot.situation,
            emotion: snapshot.emotion,
            intensity: snapshot.intensity,
            acceptance_statement: snapshot.acceptance_statement,
            action_type: snapshot.action_type,
            action_completed: snapshot.action_completed,
            actual_duration: snapshot.actual_duration,
            action_notes: snapshot.action_notes,
            progress_percentage: session.progress_percentage(),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            completed_at: snapshot.completed_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct GroundingSessionList {
    pub sessions: Vec<GroundingSessionResponse>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckInRequest {
    pub situation: String,
    pub emotion: String,
    /// 1 to 10.
    pub intensity: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct AcceptanceRequest {
    pub acceptance_statement: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ActionChoiceRequest {
    /// One of the identifiers from `GET /grounding/actions`.
    pub action_type: String,
    pub action_notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ActionCompletionRequest {
    /// 1 to 3600.
    pub duration_seconds: u32,
}

/// One entry of the quick-action catalog.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub action_type: String,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub duration_minutes: u32,
    /// What to collect from the user once the action is done.
    #[schema(value_type = Object)]
    pub input: Value,
}

impl From<ActionType> for ActionResponse {
    fn from(action: ActionType) -> Self {
        let meta = action.metadata();
        Self {
            action_type: action.as_str().to_string(),
            name: meta.name.to_string(),
            icon: meta.icon.to_string(),
            description: meta.description.to_string(),
            duration_minutes: meta.duration_minutes,
            input: input_descriptor(&meta.input),
        }
    }
}

fn input_descriptor(input: &ActionInput) -> Value {
    match input {
        ActionInput::None => json!({ "type": "none" }),
        ActionInput::Text {
            prompt,
            required,
            max_length,
        } => json!({
            "type": "text",
            "prompt": prompt,
            "required": required,
            "max_length": max_length,
        }),
        ActionInput::Counter {
            prompt,
            min,
            max,
            default,
            unit,
        } => json!({
            "type": "counter",
            "prompt": prompt,
            "min": min,
            "max": max,
            "default": default,
            "unit": unit,
        }),
        ActionInput::TextList {
            prompt,
            count,
            max_length,
            labels,
        } => json!({
            "type": "text_list",
            "prompt": prompt,
            "count": count,
            "max_length": max_length,
            "labels": labels,
        }),
        ActionInput::Checklist {
            prompt,
            options,
            min_selections,
        } => json!({
            "type": "checklist",
            "prompt": prompt,
            "options": options,
            "min_selections": min_selections,
        }),
        ActionInput::Grounding54321 { prompt, senses } => json!({
            "type": "grounding_54321",
            "prompt": prompt,
            "senses": senses
                .iter()
                .map(|s| json!({ "sense": s.sense, "count": s.count, "label": s.label }))
                .collect::<Vec<_>>(),
        }),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// The quick actions a grounding session can choose from.
#[utoipa::path(
    get,
    path = "/grounding/actions",
    responses(
        (status = 200, description = "The action catalog", body = [ActionResponse])
    )
)]
pub async fn list_actions() -> Json<Vec<ActionResponse>> {
    Json(ActionType::all().iter().copied().map(ActionResponse::from).collect())
}

#[utoipa::path(
    post,
    path = "/grounding/sessions",
    responses(
        (status = 201, description = "Session created", body = GroundingSessionResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn create_grounding_session(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = state
        .sessions
        .create(KIND, user_id)
        .await
        .map_err(session_failure)?;
    Ok((StatusCode::CREATED, Json(GroundingSessionResponse::from(&session))))
}

#[utoipa::path(
    get,
    path = "/grounding/sessions",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of sessions", body = GroundingSessionList)
    )
)]
pub async fn list_grounding_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let page = state
        .sessions
        .list(KIND, user_id, query.limit, query.offset)
        .await
        .map_err(session_failure)?;
    Ok(Json(GroundingSessionList {
        sessions: page.sessions.iter().map(Into::into).collect(),
        total: page.total,
        limit: page.limit,
        offset: page.offset,
    }))
}

#[utoipa::path(
    get,
    path = "/grounding/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "The session", body = GroundingSessionResponse),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "No such session")
    )
)]
pub async fn get_grounding_session(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = state
        .sessions
        .get(KIND, id, user_id)
        .await
        .map_err(session_failure)?;
    Ok(Json(GroundingSessionResponse::from(&session)))
}

/// Step 1: what is happening and how strong the feeling is.
#[utoipa::path(
    put,
    path = "/grounding/sessions/{id}/checkin",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Check-in stored", body = GroundingSessionResponse),
        (status = 400, description = "Invalid check-in"),
        (status = 409, description = "Check-in cannot be written now")
    )
)]
pub async fn set_check_in(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(req): Json<CheckInRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let input = StepInput::CheckIn {
        situation: req.situation,
        emotion: req.emotion,
        intensity: req.intensity,
    };
    write_step(&state, id, user_id, 1, input).await
}

/// Step 2: the acceptance statement.
#[utoipa::path(
    put,
    path = "/grounding/sessions/{id}/acceptance",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = AcceptanceRequest,
    responses(
        (status = 200, description = "Acceptance stored", body = GroundingSessionResponse),
        (status = 400, description = "Empty or too long"),
        (status = 409, description = "Acceptance cannot be written now")
    )
)]
pub async fn set_acceptance(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(req): Json<AcceptanceRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    write_step(&state, id, user_id, 2, req.acceptance_statement.into()).await
}

/// Step 3: choose a quick action. The session stays on step 3 until the action is completed.
#[utoipa::path(
    put,
    path = "/grounding/sessions/{id}/action",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = ActionChoiceRequest,
    responses(
        (status = 200, description = "Action chosen", body = GroundingSessionResponse),
        (status = 400, description = "Unknown action type"),
        (status = 409, description = "Action cannot be chosen now")
    )
)]
pub async fn set_action(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActionChoiceRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let input = StepInput::ActionChoice {
        action_type: req.action_type,
        notes: req.action_notes,
    };
    write_step(&state, id, user_id, 3, input).await
}

/// Step 4: record that the chosen action was carried out.
#[utoipa::path(
    put,
    path = "/grounding/sessions/{id}/action/complete",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = ActionCompletionRequest,
    responses(
        (status = 200, description = "Action completed", body = GroundingSessionResponse),
        (status = 400, description = "Duration out of range"),
        (status = 409, description = "No action chosen, or the session is completed")
    )
)]
pub async fn complete_action(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActionCompletionRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = state
        .sessions
        .complete_action(id, user_id, req.duration_seconds)
        .await
        .map_err(session_failure)?;
    Ok(Json(GroundingSessionResponse::from(&session)))
}

#[utoipa::path(
    post,
    path = "/grounding/sessions/{id}/complete",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session completed", body = GroundingSessionResponse),
        (status = 409, description = "Steps are missing or the session is already completed")
    )
)]
pub async fn complete_grounding_session(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let session = state
        .sessions
        .complete_session(KIND, id, user_id)
        .await
        .map_err(session_failure)?;
    Ok(Json(GroundingSessionResponse::from(&session)))
}

#[utoipa::path(
    delete,
    path = "/grounding/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "No such session")
    )
)]
pub async fn delete_grounding_session(
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

async fn write_step(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
    step: u8,
    input: StepInput,
) -> Result<Json<GroundingSessionResponse>, HandlerError> {
    let session = state
        .sessions
        .set_step_response(KIND, id, user_id, step, input)
        .await
        .map_err(session_failure)?;
    Ok(Json(GroundingSessionResponse::from(&session)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_every_action_with_an_input_descriptor() {
        let actions: Vec<ActionResponse> =
            ActionType::all().iter().copied().map(ActionResponse::from).collect();
        assert_eq!(actions.len(), 13);
        assert!(actions.iter().all(|a| a.input.get("type").is_some()));

        let grounding = actions
            .iter()
            .find(|a| a.action_type == "grounding_5_4_3_2_1")
            .unwrap();
        assert_eq!(grounding.input["type"], "grounding_54321");
        assert_eq!(grounding.input["senses"].as_array().map(Vec::len), Some(5));
    }

    #[test]
    fn breathing_needs_no_input() {
        let breathing = ActionResponse::from(ActionType::BreathingExercise);
        assert_eq!(breathing.input, json!({ "type": "none" }));
        assert_eq!(breathing.duration_minutes, 1);
    }
}
