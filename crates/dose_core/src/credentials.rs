//! crates/dose_core/src/credentials.rs
//!
//! Lifecycle of one-shot credentials: password-reset tokens and the token
//! blacklist.
//!
//! A reset token is valid iff it is unused and its expiry has not passed. It is
//! consumed at redemption, through a single compare-and-set in the store. A
//! blacklist entry is never removed before the revoked token's own expiry.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::TokenPolicy;
use crate::domain::{BlacklistEntry, ResetTokenRecord};
use crate::ports::{BlacklistStore, PortError, ResetTokenStore};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The token is absent, already used, or expired.
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error(transparent)]
    Port(#[from] PortError),
}

//=========================================================================================
// Random and Hash Providers
//=========================================================================================

/// Source of raw, high-entropy token values.
pub trait TokenSource: Send + Sync {
    fn generate(&self) -> String;
}

/// 32 bytes from the operating system's CSPRNG, URL-safe base64 encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn generate(&self) -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// One-way hash used for token-at-rest storage (SHA-256, hex encoded).
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

//=========================================================================================
// Lifecycle Helper
//=========================================================================================

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub reset_tokens: u64,
    pub blacklist_entries: u64,
}

#[derive(Clone)]
pub struct CredentialLifecycle {
    resets: Arc<dyn ResetTokenStore>,
    blacklist: Arc<dyn BlacklistStore>,
    tokens: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
}

impl CredentialLifecycle {
    pub fn new(
        resets: Arc<dyn ResetTokenStore>,
        blacklist: Arc<dyn BlacklistStore>,
        tokens: Arc<dyn TokenSource>,
        clock: Arc<dyn Clock>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            resets,
            blacklist,
            tokens,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Issues a reset token for `user_id`, replacing any earlier one.
    ///
    /// Returns the raw value (to hand to the user, never stored) together with
    /// the stored record.
    pub async fn issue_reset_token(
        &self,
        user_id: Uuid,
    ) -> Result<(String, ResetTokenRecord), CredentialError> {
        let raw = self.tokens.generate();
        let now = self.clock.now();
        let record = ResetTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_token(&raw),
            created_at: now,
            expires_at: now + self.policy.reset_token_ttl,
            is_used: false,
        };

        self.resets.replace_for_user(&record).await?;
        info!(user_id = %user_id, expires_at = %record.expires_at, "Issued password reset token");
        Ok((raw, record))
    }

    /// Consumes a reset token and returns the user it was issued to.
    pub async fn redeem_reset_token(&self, raw: &str) -> Result<Uuid, CredentialError> {
        let now = self.clock.now();
        match self.resets.redeem(&hash_token(raw.trim()), now).await? {
            Some(record) => {
                info!(user_id = %record.user_id, "Redeemed password reset token");
                Ok(record.user_id)
            }
            None => {
                warn!("Rejected an invalid, used or expired reset token");
                Err(CredentialError::InvalidOrExpiredToken)
            }
        }
    }

    /// Revokes `token_id` until `natural_expiry`.
    pub async fn blacklist(
        &self,
        token_id: &str,
        user_id: Uuid,
        natural_expiry: DateTime<Utc>,
    ) -> Result<BlacklistEntry, CredentialError> {
        let entry = BlacklistEntry {
            token_id: token_id.to_string(),
            user_id,
            blacklisted_at: self.clock.now(),
            expires_at: natural_expiry,
        };
        self.blacklist.insert(&entry).await?;
        debug!(user_id = %user_id, expires_at = %natural_expiry, "Token blacklisted");
        Ok(entry)
    }

    pub async fn is_blacklisted(&self, token_id: &str) -> Result<bool, CredentialError> {
        Ok(self
            .blacklist
            .contains_active(token_id, self.clock.now())
            .await?)
    }

    /// Deletes reset tokens and blacklist entries whose expiry has passed.
    /// Nothing is removed before its own `expires_at`.
    pub async fn purge_expired(&self) -> Result<PurgeReport, CredentialError> {
        let now = self.clock.now();
        let report = PurgeReport {
            reset_tokens: self.resets.purge_expired(now).await?,
            blacklist_entries: self.blacklist.purge_expired(now).await?,
        };
        if report != PurgeReport::default() {
            debug!(
                reset_tokens = report.reset_tokens,
                blacklist_entries = report.blacklist_entries,
                "Purged expired credentials"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let source = OsTokenSource;
        let a = source.generate();
        let b = source.generate();
        // 32 bytes -> 43 unpadded base64 characters
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hashing_is_deterministic_sha256() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }
}
