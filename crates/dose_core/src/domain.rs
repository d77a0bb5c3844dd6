//! crates/dose_core/src/domain.rs
//!
//! Plain data structures for users, auth sessions and one-shot credentials.
//! These structs are independent of any database or serialization format.
//! The guided-session aggregate lives in `session.rs`.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

//=========================================================================================
// Users
//=========================================================================================

/// A validated, lower-cased email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid email address: {0}")]
pub struct InvalidEmail(pub String);

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .unwrap_or_else(|e| panic!("email pattern does not compile: {e}"))
    })
}

impl Email {
    pub fn parse(raw: &str) -> Result<Self, InvalidEmail> {
        let trimmed = raw.trim();
        if email_pattern().is_match(trimmed) {
            Ok(Self(trimmed.to_lowercase()))
        } else {
            Err(InvalidEmail(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Email {
    type Err = InvalidEmail;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Email::parse(raw)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Represents a user - used throughout app
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login and password checks - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    /// `None` for accounts created through an OAuth provider.
    pub hashed_password: Option<String>,
    pub is_active: bool,
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub hashed_password: Option<String>,
    pub full_name: Option<String>,
    pub is_verified: bool,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// OAuth
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProviderKind {
    Google,
    Github,
    Linkedin,
}

impl OAuthProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProviderKind::Google => "google",
            OAuthProviderKind::Github => "github",
            OAuthProviderKind::Linkedin => "linkedin",
        }
    }
}

impl fmt::Display for OAuthProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported OAuth provider: {0}")]
pub struct UnsupportedProvider(pub String);

impl FromStr for OAuthProviderKind {
    type Err = UnsupportedProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "google" => Ok(OAuthProviderKind::Google),
            "github" => Ok(OAuthProviderKind::Github),
            "linkedin" => Ok(OAuthProviderKind::Linkedin),
            other => Err(UnsupportedProvider(other.to_string())),
        }
    }
}

/// Profile data returned by a provider after a successful code exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthProfile {
    pub provider: OAuthProviderKind,
    pub provider_user_id: String,
    pub email: String,
    pub name: Option<String>,
}

/// A user's link to an external identity.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: OAuthProviderKind,
    pub provider_user_id: String,
    pub provider_email: Option<String>,
    pub linked_at: DateTime<Utc>,
}

//=========================================================================================
// One-shot Credentials
//=========================================================================================

/// A stored password-reset token. Only the hash of the raw value is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
}

impl ResetTokenRecord {
    /// Valid iff unused and not yet expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && now < self.expires_at
    }
}

/// A revoked token, kept until the token would have expired on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct BlacklistEntry {
    pub token_id: String,
    pub user_id: Uuid,
    pub blacklisted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BlacklistEntry {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
