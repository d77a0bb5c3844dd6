//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the repository and credential-store ports from the `dose_core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dose_core::{
    AuthSession, AuthSessionRepository, BlacklistEntry, BlacklistStore, Email, NewUser,
    OAuthAccountRepository, OAuthLink, OAuthProviderKind, Page, PortError, PortResult,
    ResetTokenRecord, ResetTokenStore, Session, SessionKind, SessionRepository, SessionSnapshot,
    User, UserCredentials, UserRepository,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every storage port of the core.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const SESSION_COLUMNS: &str = "id, user_id, kind, status, current_step, version, \
     situation_response, perception_response, affect_response, response_response, \
     key_result_response, situation, emotion, intensity, acceptance_statement, action_type, \
     action_completed, actual_duration, action_notes, created_at, updated_at, completed_at";

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    status: String,
    current_step: i32,
    version: i64,
    situation_response: Option<String>,
    perception_response: Option<String>,
    affect_response: Option<String>,
    response_response: Option<String>,
    key_result_response: Option<String>,
    situation: Option<String>,
    emotion: Option<String>,
    intensity: Option<i32>,
    acceptance_statement: Option<String>,
    action_type: Option<String>,
    action_completed: bool,
    actual_duration: Option<i64>,
    action_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}
impl SessionRecord {
    /// Stored rows are re-validated on the way in; a corrupt row is an error,
    /// never silently coerced.
    fn to_domain(self) -> PortResult<Session> {
        let kind = self
            .kind
            .parse::<SessionKind>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Session::from_snapshot(SessionSnapshot {
            id: self.id,
            user_id: self.user_id,
            kind,
            status: self.status,
            current_step: self.current_step,
            version: self.version,
            situation_response: self.situation_response,
            perception_response: self.perception_response,
            affect_response: self.affect_response,
            response_response: self.response_response,
            key_result_response: self.key_result_response,
            situation: self.situation,
            emotion: self.emotion,
            intensity: self.intensity,
            acceptance_statement: self.acceptance_statement,
            action_type: self.action_type,
            action_completed: self.action_completed,
            actual_duration: self.actual_duration,
            action_notes: self.action_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
        .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    full_name: Option<String>,
    is_active: bool,
    is_verified: bool,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
            full_name: self.full_name,
            is_active: self.is_active,
            is_verified: self.is_verified,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserCredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: Option<String>,
    is_active: bool,
}
impl UserCredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
            is_active: self.is_active,
        }
    }
}

#[derive(FromRow)]
struct AuthSessionRecord {
    id: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}
impl AuthSessionRecord {
    fn to_domain(self) -> AuthSession {
        AuthSession {
            id: self.id,
            user_id: self.user_id,
            expires_at: self.expires_at,
        }
    }
}

#[derive(FromRow)]
struct OAuthLinkRecord {
    id: Uuid,
    user_id: Uuid,
    provider: String,
    provider_user_id: String,
    provider_email: Option<String>,
    linked_at: DateTime<Utc>,
}
impl OAuthLinkRecord {
    fn to_domain(self) -> PortResult<OAuthLink> {
        let provider = self
            .provider
            .parse::<OAuthProviderKind>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(OAuthLink {
            id: self.id,
            user_id: self.user_id,
            provider,
            provider_user_id: self.provider_user_id,
            provider_email: self.provider_email,
            linked_at: self.linked_at,
        })
    }
}

#[derive(FromRow)]
struct ResetTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_used: bool,
}
impl ResetTokenRow {
    fn to_domain(self) -> ResetTokenRecord {
        ResetTokenRecord {
            id: self.id,
            user_id: self.user_id,
            token_hash: self.token_hash,
            created_at: self.created_at,
            expires_at: self.expires_at,
            is_used: self.is_used,
        }
    }
}

//=========================================================================================
// `SessionRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionRepository for DbAdapter {
    async fn create(&self, session: &Session) -> PortResult<Session> {
        let s = session.to_snapshot();
        let sql = format!(
            "INSERT INTO guided_sessions ({SESSION_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22) \
             RETURNING {SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(s.id)
            .bind(s.user_id)
            .bind(s.kind.as_str())
            .bind(s.status)
            .bind(s.current_step)
            .bind(s.version)
            .bind(s.situation_response)
            .bind(s.perception_response)
            .bind(s.affect_response)
            .bind(s.response_response)
            .bind(s.key_result_response)
            .bind(s.situation)
            .bind(s.emotion)
            .bind(s.intensity)
            .bind(s.acceptance_statement)
            .bind(s.action_type)
            .bind(s.action_completed)
            .bind(s.actual_duration)
            .bind(s.action_notes)
            .bind(s.created_at)
            .bind(s.updated_at)
            .bind(s.completed_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PortError::Conflict(format!("Session {} already exists", session.id()))
                } else {
                    unexpected(e)
                }
            })?;
        record.to_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> PortResult<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM guided_sessions WHERE id = $1");
        sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(SessionRecord::to_domain)
            .transpose()
    }

    async fn update(&self, session: &Session, expected_version: i64) -> PortResult<Session> {
        let s = session.to_snapshot();
        let sql = format!(
            "UPDATE guided_sessions SET \
               status = $3, current_step = $4, version = $5, \
               situation_response = $6, perception_response = $7, affect_response = $8, \
               response_response = $9, key_result_response = $10, situation = $11, \
               emotion = $12, intensity = $13, acceptance_statement = $14, action_type = $15, \
               action_completed = $16, actual_duration = $17, action_notes = $18, \
               updated_at = $19, completed_at = $20 \
             WHERE id = $1 AND version = $2 \
             RETURNING {SESSION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(s.id)
            .bind(expected_version)
            .bind(s.status)
            .bind(s.current_step)
            .bind(s.version)
            .bind(s.situation_response)
            .bind(s.perception_response)
            .bind(s.affect_response)
            .bind(s.response_response)
            .bind(s.key_result_response)
            .bind(s.situation)
            .bind(s.emotion)
            .bind(s.intensity)
            .bind(s.acceptance_statement)
            .bind(s.action_type)
            .bind(s.action_completed)
            .bind(s.actual_duration)
            .bind(s.action_notes)
            .bind(s.updated_at)
            .bind(s.completed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;

        if let Some(record) = updated {
            return record.to_domain();
        }

        // Nothing matched: either the row is gone or another writer got there first.
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM guided_sessions WHERE id = $1)")
                .bind(s.id)
                .fetch_one(&self.pool)
                .await
                .map_err(unexpected)?;
        if exists {
            Err(PortError::Conflict(format!(
                "Session {} is no longer at version {}",
                s.id, expected_version
            )))
        } else {
            Err(PortError::NotFound(format!("Session {} not found", s.id)))
        }
    }

    async fn delete(&self, id: Uuid) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM guided_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        kind: SessionKind,
        page: Page,
    ) -> PortResult<(Vec<Session>, u64)> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM guided_sessions \
             WHERE user_id = $1 AND kind = $2 \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let records = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(owner_id)
            .bind(kind.as_str())
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM guided_sessions WHERE user_id = $1 AND kind = $2",
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        let sessions = records
            .into_iter()
            .map(SessionRecord::to_domain)
            .collect::<PortResult<Vec<_>>>()?;
        Ok((sessions, total.max(0) as u64))
    }
}

//=========================================================================================
// `UserRepository` and `AuthSessionRepository` Implementations
//=========================================================================================

#[async_trait]
impl UserRepository for DbAdapter {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password, full_name, is_verified) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING user_id, email, full_name, is_active, is_verified, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(new_user.email.as_str())
        .bind(new_user.hashed_password)
        .bind(new_user.full_name)
        .bind(new_user.is_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict("Email already registered".to_string())
            } else {
                unexpected(e)
            }
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, full_name, is_active, is_verified, created_at \
             FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn get_user_by_email(&self, email: &Email) -> PortResult<Option<UserCredentials>> {
        let record = sqlx::query_as::<_, UserCredentialsRecord>(
            "SELECT user_id, email, hashed_password, is_active FROM users WHERE email = $1",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(UserCredentialsRecord::to_domain))
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET hashed_password = $1 WHERE user_id = $2")
            .bind(hashed_password)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<bool> {
        // Sessions, tokens, links and auth sessions go with the user (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuthSessionRepository for DbAdapter {
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<AuthSession> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3) \
             RETURNING id, user_id, expires_at",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn validate_auth_session(&self, session_id: &str, now: DateTime<Utc>) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > $2",
        )
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn get_auth_session(&self, session_id: &str) -> PortResult<Option<AuthSession>> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT id, user_id, expires_at FROM auth_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(AuthSessionRecord::to_domain))
    }
}

#[async_trait]
impl OAuthAccountRepository for DbAdapter {
    async fn get_link(
        &self,
        provider: OAuthProviderKind,
        provider_user_id: &str,
    ) -> PortResult<Option<OAuthLink>> {
        sqlx::query_as::<_, OAuthLinkRecord>(
            "SELECT id, user_id, provider, provider_user_id, provider_email, linked_at \
             FROM oauth_accounts WHERE provider = $1 AND provider_user_id = $2",
        )
        .bind(provider.as_str())
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(OAuthLinkRecord::to_domain)
        .transpose()
    }

    async fn create_link(&self, link: OAuthLink) -> PortResult<OAuthLink> {
        sqlx::query(
            "INSERT INTO oauth_accounts \
             (id, user_id, provider, provider_user_id, provider_email, linked_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(link.id)
        .bind(link.user_id)
        .bind(link.provider.as_str())
        .bind(&link.provider_user_id)
        .bind(&link.provider_email)
        .bind(link.linked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict(format!("{} identity is already linked", link.provider))
            } else {
                unexpected(e)
            }
        })?;
        Ok(link)
    }
}

//=========================================================================================
// One-shot Credential Stores
//=========================================================================================

#[async_trait]
impl ResetTokenStore for DbAdapter {
    async fn replace_for_user(&self, record: &ResetTokenRecord) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(record.user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO password_reset_tokens \
             (id, user_id, token_hash, created_at, expires_at, is_used) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.is_used)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)
    }

    async fn redeem(&self, token_hash: &str, now: DateTime<Utc>) -> PortResult<Option<ResetTokenRecord>> {
        // A single conditional UPDATE: of two racing redemptions only one sees is_used = FALSE.
        let record = sqlx::query_as::<_, ResetTokenRow>(
            "UPDATE password_reset_tokens SET is_used = TRUE \
             WHERE token_hash = $1 AND is_used = FALSE AND expires_at > $2 \
             RETURNING id, user_id, token_hash, created_at, expires_at, is_used",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ResetTokenRow::to_domain))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BlacklistStore for DbAdapter {
    async fn insert(&self, entry: &BlacklistEntry) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO token_blacklist (token_id, user_id, blacklisted_at, expires_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (token_id) DO NOTHING",
        )
        .bind(&entry.token_id)
        .bind(entry.user_id)
        .bind(entry.blacklisted_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn contains_active(&self, token_id: &str, now: DateTime<Utc>) -> PortResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM token_blacklist WHERE token_id = $1 AND expires_at > $2)",
        )
        .bind(token_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}
