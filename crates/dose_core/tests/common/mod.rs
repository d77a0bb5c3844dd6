//! In-memory port implementations shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dose_core::{
    BlacklistEntry, Email, ManualClock, NewUser, OAuthAccountRepository, OAuthLink, OAuthProfile,
    OAuthProvider, OAuthProviderKind, Page, PortError, PortResult, ResetTokenRecord,
    ResetTokenStore, BlacklistStore, Session, SessionKind, SessionLimits, SessionRepository,
    SessionSnapshot, StepMachine, TokenSource, User, UserCredentials, UserRepository,
};
use uuid::Uuid;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 7, 30, 0).unwrap()
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

pub fn machine(clock: Arc<ManualClock>) -> StepMachine {
    StepMachine::new(SessionLimits::default(), clock)
}

//=========================================================================================
// Sessions
//=========================================================================================

/// Stores snapshots so every load goes through `Session::from_snapshot`.
#[derive(Default)]
pub struct InMemorySessions {
    rows: Mutex<HashMap<Uuid, SessionSnapshot>>,
}

impl InMemorySessions {
    pub fn overwrite(&self, snapshot: SessionSnapshot) {
        self.rows.lock().unwrap().insert(snapshot.id, snapshot);
    }
}

fn restore(snapshot: SessionSnapshot) -> PortResult<Session> {
    Session::from_snapshot(snapshot).map_err(|e| PortError::Unexpected(e.to_string()))
}

#[async_trait]
impl SessionRepository for InMemorySessions {
    async fn create(&self, session: &Session) -> PortResult<Session> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&session.id()) {
            return Err(PortError::Conflict(format!("Session {} exists", session.id())));
        }
        rows.insert(session.id(), session.to_snapshot());
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> PortResult<Option<Session>> {
        let snapshot = self.rows.lock().unwrap().get(&id).cloned();
        snapshot.map(restore).transpose()
    }

    async fn update(&self, session: &Session, expected_version: i64) -> PortResult<Session> {
        let mut rows = self.rows.lock().unwrap();
        let stored = rows
            .get_mut(&session.id())
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session.id())))?;
        if stored.version != expected_version {
            return Err(PortError::Conflict(format!(
                "Session {} is at version {}, expected {}",
                session.id(),
                stored.version,
                expected_version
            )));
        }
        *stored = session.to_snapshot();
        Ok(session.clone())
    }

    async fn delete(&self, id: Uuid) -> PortResult<bool> {
        Ok(self.rows.lock().unwrap().remove(&id).is_some())
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        kind: SessionKind,
        page: Page,
    ) -> PortResult<(Vec<Session>, u64)> {
        let mut owned: Vec<SessionSnapshot> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == owner_id && s.kind == kind)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = owned.len() as u64;
        let items = owned
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(restore)
            .collect::<PortResult<Vec<_>>>()?;
        Ok((items, total))
    }
}

//=========================================================================================
// Credentials
//=========================================================================================

#[derive(Default)]
pub struct InMemoryResetTokens {
    pub rows: Mutex<Vec<ResetTokenRecord>>,
}

#[async_trait]
impl ResetTokenStore for InMemoryResetTokens {
    async fn replace_for_user(&self, record: &ResetTokenRecord) -> PortResult<()> {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|r| r.user_id != record.user_id);
        rows.push(record.clone());
        Ok(())
    }

    async fn redeem(&self, token_hash: &str, now: DateTime<Utc>) -> PortResult<Option<ResetTokenRecord>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|r| r.token_hash == token_hash && r.is_valid_at(now))
            .map(|r| {
                r.is_used = true;
                r.clone()
            }))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.expires_at > now);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryBlacklist {
    pub rows: Mutex<HashMap<String, BlacklistEntry>>,
}

#[async_trait]
impl BlacklistStore for InMemoryBlacklist {
    async fn insert(&self, entry: &BlacklistEntry) -> PortResult<()> {
        self.rows
            .lock()
            .unwrap()
            .entry(entry.token_id.clone())
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn contains_active(&self, token_id: &str, now: DateTime<Utc>) -> PortResult<bool> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(token_id)
            .is_some_and(|e| e.is_active_at(now)))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, e| e.expires_at > now);
        Ok((before - rows.len()) as u64)
    }
}

/// Hands out a fixed sequence of raw tokens.
pub struct ScriptedTokens {
    next: Mutex<Vec<String>>,
}

impl ScriptedTokens {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            next: Mutex::new(tokens.iter().rev().map(|t| t.to_string()).collect()),
        }
    }
}

impl TokenSource for ScriptedTokens {
    fn generate(&self) -> String {
        self.next.lock().unwrap().pop().expect("script ran out of tokens")
    }
}

//=========================================================================================
// Users and OAuth
//=========================================================================================

#[derive(Default)]
pub struct InMemoryUsers {
    rows: Mutex<Vec<(User, Option<String>)>>,
}

impl InMemoryUsers {
    pub fn seed(&self, email: &str, is_active: bool) -> User {
        let user = User {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: None,
            is_active,
            is_verified: false,
            created_at: start_time(),
        };
        self.rows
            .lock()
            .unwrap()
            .push((user.clone(), Some("argon2-hash".to_string())));
        user
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|(u, _)| u.email == new_user.email.as_str()) {
            return Err(PortError::Conflict("email taken".to_string()));
        }
        let user = User {
            user_id: Uuid::new_v4(),
            email: new_user.email.to_string(),
            full_name: new_user.full_name,
            is_active: true,
            is_verified: new_user.is_verified,
            created_at: start_time(),
        };
        rows.push((user.clone(), new_user.hashed_password));
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u.user_id == user_id)
            .map(|(u, _)| u.clone()))
    }

    async fn get_user_by_email(&self, email: &Email) -> PortResult<Option<UserCredentials>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u.email == email.as_str())
            .map(|(u, hash)| UserCredentials {
                user_id: u.user_id,
                email: u.email.clone(),
                hashed_password: hash.clone(),
                is_active: u.is_active,
            }))
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|(u, _)| u.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(user_id.to_string()))?;
        row.1 = Some(hashed_password.to_string());
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(u, _)| u.user_id != user_id);
        Ok(rows.len() != before)
    }
}

#[derive(Default)]
pub struct InMemoryLinks {
    pub rows: Mutex<Vec<OAuthLink>>,
}

#[async_trait]
impl OAuthAccountRepository for InMemoryLinks {
    async fn get_link(
        &self,
        provider: OAuthProviderKind,
        provider_user_id: &str,
    ) -> PortResult<Option<OAuthLink>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.provider == provider && l.provider_user_id == provider_user_id)
            .cloned())
    }

    async fn create_link(&self, link: OAuthLink) -> PortResult<OAuthLink> {
        self.rows.lock().unwrap().push(link.clone());
        Ok(link)
    }
}

/// Provider that returns a canned profile for one known code.
pub struct StubProvider {
    pub code: String,
    pub profile: OAuthProfile,
}

#[async_trait]
impl OAuthProvider for StubProvider {
    fn kind(&self) -> OAuthProviderKind {
        self.profile.provider
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> PortResult<String> {
        Ok(format!("https://provider.test/authorize?redirect_uri={redirect_uri}&state={state}"))
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> PortResult<OAuthProfile> {
        if code == self.code {
            Ok(self.profile.clone())
        } else {
            Err(PortError::Unauthorized)
        }
    }
}
