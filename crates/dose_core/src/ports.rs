//! crates/dose_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core consumes.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or
//! identity providers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AuthSession, BlacklistEntry, Email, NewUser, OAuthLink, OAuthProfile, OAuthProviderKind,
    ResetTokenRecord, User, UserCredentials,
};
use crate::session::{Session, SessionKind};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A write lost a race with another writer (stale version, duplicate key).
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Window into an owner's session list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

//=========================================================================================
// Repository Ports
//=========================================================================================

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> PortResult<Session>;

    async fn get_by_id(&self, id: Uuid) -> PortResult<Option<Session>>;

    /// Persists `session` only if the stored version still equals
    /// `expected_version`. A mismatch must fail with `PortError::Conflict`,
    /// a missing row with `PortError::NotFound`.
    async fn update(&self, session: &Session, expected_version: i64) -> PortResult<Session>;

    async fn delete(&self, id: Uuid) -> PortResult<bool>;

    /// Newest first. Returns the page and the owner's total for this kind.
    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        kind: SessionKind,
        page: Page,
    ) -> PortResult<(Vec<Session>, u64)>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `PortError::Conflict` when the email is taken.
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>>;

    async fn get_user_by_email(&self, email: &Email) -> PortResult<Option<UserCredentials>>;

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()>;

    /// Removes the user and cascades to everything they own.
    async fn delete_user(&self, user_id: Uuid) -> PortResult<bool>;
}

#[async_trait]
pub trait AuthSessionRepository: Send + Sync {
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<AuthSession>;

    /// Returns the owner of an unexpired auth session, `Unauthorized` otherwise.
    async fn validate_auth_session(&self, session_id: &str, now: DateTime<Utc>) -> PortResult<Uuid>;

    async fn get_auth_session(&self, session_id: &str) -> PortResult<Option<AuthSession>>;
}

#[async_trait]
pub trait OAuthAccountRepository: Send + Sync {
    async fn get_link(
        &self,
        provider: OAuthProviderKind,
        provider_user_id: &str,
    ) -> PortResult<Option<OAuthLink>>;

    async fn create_link(&self, link: OAuthLink) -> PortResult<OAuthLink>;
}

//=========================================================================================
// One-shot Credential Stores
//=========================================================================================

#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Deletes every existing token for the record's user, then inserts the
    /// record, as one unit.
    async fn replace_for_user(&self, record: &ResetTokenRecord) -> PortResult<()>;

    /// Atomically marks the token with this hash as used, but only if it is
    /// unused and unexpired at `now`. Returns the redeemed record, or `None`
    /// when nothing matched. Two concurrent calls for one hash must not both
    /// return `Some`.
    async fn redeem(&self, token_hash: &str, now: DateTime<Utc>) -> PortResult<Option<ResetTokenRecord>>;

    /// Deletes tokens with `expires_at <= now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64>;
}

#[async_trait]
pub trait BlacklistStore: Send + Sync {
    /// Inserting an id that is already present is not an error.
    async fn insert(&self, entry: &BlacklistEntry) -> PortResult<()>;

    /// Whether an entry for `token_id` exists with `expires_at > now`.
    async fn contains_active(&self, token_id: &str, now: DateTime<Utc>) -> PortResult<bool>;

    /// Deletes entries with `expires_at <= now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64>;
}

//=========================================================================================
// External Identity Provider
//=========================================================================================

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn kind(&self) -> OAuthProviderKind;

    /// The provider page the browser is sent to, carrying `state` back to
    /// `redirect_uri`.
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> PortResult<String>;

    /// Exchanges an authorization code for the user's profile.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> PortResult<OAuthProfile>;
}
