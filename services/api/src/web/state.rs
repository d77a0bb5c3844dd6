//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use dose_core::{
    AccountLinker, AuthSessionRepository, BlacklistStore, Clock, CredentialLifecycle,
    OAuthAccountRepository, OAuthProvider, OAuthProviderKind, OsTokenSource, ResetTokenStore,
    SessionRepository, SessionService, StepMachine, UserRepository,
};
use std::collections::HashMap;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub auth_sessions: Arc<dyn AuthSessionRepository>,
    pub sessions: SessionService,
    pub credentials: CredentialLifecycle,
    pub accounts: AccountLinker,
    /// Only the providers with configured client credentials.
    pub oauth_providers: HashMap<OAuthProviderKind, Arc<dyn OAuthProvider>>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires every core service onto one storage adapter.
    pub fn new<S>(store: Arc<S>, clock: Arc<dyn Clock>, config: Arc<Config>) -> Self
    where
        S: UserRepository
            + AuthSessionRepository
            + SessionRepository
            + ResetTokenStore
            + BlacklistStore
            + OAuthAccountRepository
            + 'static,
    {
        let machine = StepMachine::new(config.session_limits.clone(), clock.clone());
        let sessions = SessionService::new(store.clone(), machine);
        let credentials = CredentialLifecycle::new(
            store.clone(),
            store.clone(),
            Arc::new(OsTokenSource),
            clock.clone(),
            config.token_policy(),
        );
        let accounts = AccountLinker::new(store.clone(), store.clone(), clock.clone());

        Self {
            users: store.clone(),
            auth_sessions: store,
            sessions,
            credentials,
            accounts,
            oauth_providers: HashMap::new(),
            clock,
            config,
        }
    }

    /// Registers a provider for the `/auth/oauth/{provider}` routes.
    pub fn with_oauth_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.oauth_providers.insert(provider.kind(), provider);
        self
    }
}
