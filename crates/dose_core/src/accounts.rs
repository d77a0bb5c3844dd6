//! crates/dose_core/src/accounts.rs
//!
//! Linking external OAuth identities to local users.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{Email, InvalidEmail, NewUser, OAuthLink, OAuthProfile, User};
use crate::ports::{OAuthAccountRepository, OAuthProvider, PortError, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    InvalidEmail(#[from] InvalidEmail),
    #[error("Linked user {0} no longer exists")]
    OrphanedLink(Uuid),
    #[error("Account {0} is deactivated")]
    Inactive(Uuid),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// How the user behind a provider identity was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The identity was already linked.
    ExistingLink,
    /// Linked to the local user with the same email.
    LinkedByEmail,
    /// A new, password-less user was created and linked.
    Created,
}

#[derive(Clone)]
pub struct AccountLinker {
    users: Arc<dyn UserRepository>,
    links: Arc<dyn OAuthAccountRepository>,
    clock: Arc<dyn Clock>,
}

impl AccountLinker {
    pub fn new(
        users: Arc<dyn UserRepository>,
        links: Arc<dyn OAuthAccountRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            links,
            clock,
        }
    }

    /// Exchanges a provider code and resolves the resulting profile.
    pub async fn sign_in_with_code(
        &self,
        provider: &dyn OAuthProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(User, LinkOutcome), AccountError> {
        let profile = provider.exchange_code(code, redirect_uri).await?;
        self.link_or_create(profile).await
    }

    /// Resolves a provider profile to a local user, linking or creating as needed.
    pub async fn link_or_create(
        &self,
        profile: OAuthProfile,
    ) -> Result<(User, LinkOutcome), AccountError> {
        // 1. Existing link: log the linked user in.
        if let Some(link) = self
            .links
            .get_link(profile.provider, &profile.provider_user_id)
            .await?
        {
            let user = self
                .users
                .get_user_by_id(link.user_id)
                .await?
                .ok_or(AccountError::OrphanedLink(link.user_id))?;
            ensure_active(&user)?;
            return Ok((user, LinkOutcome::ExistingLink));
        }

        // 2. Otherwise find the user by email, or create a verified one.
        let email = Email::parse(&profile.email)?;
        let (user, outcome) = match self.users.get_user_by_email(&email).await? {
            Some(credentials) => {
                let user = self
                    .users
                    .get_user_by_id(credentials.user_id)
                    .await?
                    .ok_or_else(|| {
                        PortError::NotFound(format!("User {} not found", credentials.user_id))
                    })?;
                (user, LinkOutcome::LinkedByEmail)
            }
            None => {
                let user = self
                    .users
                    .create_user(NewUser {
                        email: email.clone(),
                        hashed_password: None,
                        full_name: profile.name.clone(),
                        is_verified: true,
                    })
                    .await?;
                (user, LinkOutcome::Created)
            }
        };
        ensure_active(&user)?;

        // 3. Record the link.
        self.links
            .create_link(OAuthLink {
                id: Uuid::new_v4(),
                user_id: user.user_id,
                provider: profile.provider,
                provider_user_id: profile.provider_user_id.clone(),
                provider_email: Some(email.to_string()),
                linked_at: self.clock.now(),
            })
            .await?;

        info!(
            user_id = %user.user_id,
            provider = %profile.provider,
            outcome = ?outcome,
            "Linked OAuth identity"
        );
        Ok((user, outcome))
    }
}

fn ensure_active(user: &User) -> Result<(), AccountError> {
    if user.is_active {
        Ok(())
    } else {
        Err(AccountError::Inactive(user.user_id))
    }
}
