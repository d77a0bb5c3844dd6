//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::Duration;
use dose_core::{OAuthProviderKind, SessionLimits, TokenPolicy};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub database_max_connections: u32,
    /// Origin allowed by CORS, with credentials.
    pub allowed_origin: String,
    pub auth_session_ttl: Duration,
    pub reset_token_ttl: Duration,
    pub cleanup_interval: std::time::Duration,
    /// Echo raw reset tokens in the forgot-password response. Development only.
    pub expose_reset_token: bool,
    pub session_limits: SessionLimits,
    /// Providers with both a client id and a secret configured.
    pub oauth_clients: HashMap<OAuthProviderKind, OAuthClientConfig>,
    /// Public base URL the provider callbacks are built from.
    pub oauth_redirect_base: String,
    /// Where the browser lands after a successful OAuth sign-in.
    pub oauth_success_redirect: String,
}

/// Client credentials registered with one OAuth provider.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Some(5u32))?;
        let allowed_origin =
            lookup("ALLOWED_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Credential Lifetimes ---
        let ttl_days: i64 = parse_or(&lookup, "AUTH_SESSION_TTL_DAYS", Some(30))?;
        let reset_minutes: i64 = parse_or(&lookup, "PASSWORD_RESET_TOKEN_EXPIRE_MINUTES", Some(60))?;
        let cleanup_seconds: u64 = parse_or(&lookup, "CLEANUP_INTERVAL_SECONDS", Some(300))?;
        let auth_session_ttl = positive_duration("AUTH_SESSION_TTL_DAYS", ttl_days, Duration::try_days)?;
        let reset_token_ttl = positive_duration(
            "PASSWORD_RESET_TOKEN_EXPIRE_MINUTES",
            reset_minutes,
            Duration::try_minutes,
        )?;
        if cleanup_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "CLEANUP_INTERVAL_SECONDS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let expose_reset_token = parse_or(&lookup, "EXPOSE_RESET_TOKEN", Some(false))?;

        // --- OAuth Providers ---
        let mut oauth_clients = HashMap::new();
        for kind in [
            OAuthProviderKind::Google,
            OAuthProviderKind::Github,
            OAuthProviderKind::Linkedin,
        ] {
            if let Some(client) = oauth_client(&lookup, kind)? {
                oauth_clients.insert(kind, client);
            }
        }
        let oauth_redirect_base = lookup("OAUTH_REDIRECT_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();
        let oauth_success_redirect = lookup("OAUTH_SUCCESS_REDIRECT")
            .unwrap_or_else(|| "http://localhost:3000/auth/success".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            database_max_connections,
            allowed_origin,
            auth_session_ttl,
            reset_token_ttl,
            cleanup_interval: std::time::Duration::from_secs(cleanup_seconds),
            expose_reset_token,
            session_limits: SessionLimits::default(),
            oauth_clients,
            oauth_redirect_base,
            oauth_success_redirect,
        })
    }

    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            reset_token_ttl: self.reset_token_ttl,
        }
    }
}

/// Parses `key` when present, falls back to `default` otherwise.
fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

/// A positive amount turned into a `Duration`; zero, negative and
/// unrepresentable amounts are rejected.
fn positive_duration(
    key: &str,
    amount: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<Duration, ConfigError> {
    if amount <= 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    to_duration(amount).ok_or_else(|| {
        ConfigError::InvalidValue(key.to_string(), format!("{} is out of range", amount))
    })
}

/// `<PROVIDER>_CLIENT_ID` and `<PROVIDER>_CLIENT_SECRET`, both or neither.
fn oauth_client<F>(lookup: &F, kind: OAuthProviderKind) -> Result<Option<OAuthClientConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = kind.as_str().to_uppercase();
    let id_key = format!("{}_CLIENT_ID", prefix);
    let secret_key = format!("{}_CLIENT_SECRET", prefix);
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    match (non_empty(&id_key), non_empty(&secret_key)) {
        (Some(client_id), Some(client_secret)) => Ok(Some(OAuthClientConfig {
            client_id,
            client_secret,
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::MissingVar(secret_key)),
        (None, Some(_)) => Err(ConfigError::MissingVar(id_key)),
    }
}
