//! crates/dose_core/src/sessions.rs
//!
//! Application service for guided sessions: load, check ownership, run one
//! state-machine operation, persist with optimistic locking.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::SessionError;
use crate::machine::{StepInput, StepMachine};
use crate::ports::{Page, PortError, SessionRepository};
use crate::session::{Session, SessionKind};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum SessionServiceError {
    #[error("Session {0} not found")]
    NotFound(Uuid),
    #[error("Session {0} belongs to another user")]
    Forbidden(Uuid),
    /// Another writer updated the session between load and save.
    #[error("Session {0} was modified concurrently")]
    Conflict(Uuid),
    #[error(transparent)]
    Rejected(#[from] SessionError),
    #[error("Storage failure: {0}")]
    Storage(PortError),
}

/// One page of an owner's sessions.
#[derive(Debug, Clone)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Clone)]
pub struct SessionService {
    repo: Arc<dyn SessionRepository>,
    machine: StepMachine,
}

impl SessionService {
    pub fn new(repo: Arc<dyn SessionRepository>, machine: StepMachine) -> Self {
        Self { repo, machine }
    }

    pub fn machine(&self) -> &StepMachine {
        &self.machine
    }

    pub async fn create(&self, kind: SessionKind, user_id: Uuid) -> Result<Session, SessionServiceError> {
        let session = self.machine.start(kind, user_id);
        let created = self
            .repo
            .create(&session)
            .await
            .map_err(|e| storage(session.id(), e))?;
        info!(session_id = %created.id(), kind = %kind, "Created session");
        Ok(created)
    }

    pub async fn get(
        &self,
        kind: SessionKind,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Session, SessionServiceError> {
        self.load(kind, id, user_id).await
    }

    pub async fn list(
        &self,
        kind: SessionKind,
        user_id: Uuid,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<SessionPage, SessionServiceError> {
        let page = Page {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0),
        };
        let (sessions, total) = self
            .repo
            .list_by_owner(user_id, kind, page)
            .await
            .map_err(|e| storage(user_id, e))?;
        Ok(SessionPage {
            sessions,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    pub async fn set_step_response(
        &self,
        kind: SessionKind,
        id: Uuid,
        user_id: Uuid,
        step: u8,
        input: StepInput,
    ) -> Result<Session, SessionServiceError> {
        self.apply(kind, id, user_id, |machine, session| {
            machine.set_step_response(session, step, input)
        })
        .await
    }

    pub async fn complete_action(
        &self,
        id: Uuid,
        user_id: Uuid,
        duration_seconds: u32,
    ) -> Result<Session, SessionServiceError> {
        self.apply(SessionKind::Grounding, id, user_id, |machine, session| {
            machine.complete_action(session, duration_seconds)
        })
        .await
    }

    pub async fn complete_session(
        &self,
        kind: SessionKind,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Session, SessionServiceError> {
        self.apply(kind, id, user_id, |machine, session| {
            machine.complete_session(session)
        })
        .await
    }

    pub async fn delete(
        &self,
        kind: SessionKind,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<(), SessionServiceError> {
        self.load(kind, id, user_id).await?;
        let deleted = self.repo.delete(id).await.map_err(|e| storage(id, e))?;
        if !deleted {
            return Err(SessionServiceError::NotFound(id));
        }
        info!(session_id = %id, "Deleted session");
        Ok(())
    }

    //-------------------------------------------------------------------------------------

    async fn load(
        &self,
        kind: SessionKind,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Session, SessionServiceError> {
        let session = self
            .repo
            .get_by_id(id)
            .await
            .map_err(|e| storage(id, e))?
            .filter(|session| session.kind() == kind)
            .ok_or(SessionServiceError::NotFound(id))?;

        if !session.is_owned_by(user_id) {
            warn!(session_id = %id, user_id = %user_id, "Rejected access to a foreign session");
            return Err(SessionServiceError::Forbidden(id));
        }
        Ok(session)
    }

    async fn apply<F>(
        &self,
        kind: SessionKind,
        id: Uuid,
        user_id: Uuid,
        op: F,
    ) -> Result<Session, SessionServiceError>
    where
        F: FnOnce(&StepMachine, &Session) -> Result<Session, SessionError> + Send,
    {
        let session = self.load(kind, id, user_id).await?;
        let next = op(&self.machine, &session)?;
        let saved = self
            .repo
            .update(&next, session.version())
            .await
            .map_err(|e| storage(id, e))?;
        info!(
            session_id = %id,
            current_step = saved.current_step(),
            status = %saved.status(),
            "Session updated"
        );
        Ok(saved)
    }
}

fn storage(id: Uuid, err: PortError) -> SessionServiceError {
    match err {
        PortError::NotFound(_) => SessionServiceError::NotFound(id),
        PortError::Conflict(_) => SessionServiceError::Conflict(id),
        other => SessionServiceError::Storage(other),
    }
}
