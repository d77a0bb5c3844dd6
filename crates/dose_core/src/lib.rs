pub mod accounts;
pub mod actions;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod machine;
pub mod ports;
pub mod progress;
pub mod registry;
pub mod session;
pub mod sessions;

pub use accounts::{AccountError, AccountLinker, LinkOutcome};
pub use actions::{ActionInput, ActionMetadata, ActionType};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SessionLimits, TokenPolicy};
pub use credentials::{CredentialError, CredentialLifecycle, OsTokenSource, PurgeReport, TokenSource};
pub use domain::{AuthSession, BlacklistEntry, Email, NewUser, OAuthLink, OAuthProfile, OAuthProviderKind,
    ResetTokenRecord, User, UserCredentials};
pub use error::SessionError;
pub use machine::{can_advance_to, StepInput, StepMachine};
pub use ports::{AuthSessionRepository, BlacklistStore, OAuthAccountRepository, OAuthProvider, Page,
    PortError, PortResult, ResetTokenStore, SessionRepository, UserRepository};
pub use registry::{InputShape, SlotId, StepDef};
pub use session::{ActionRecord, CheckIn, Session, SessionKind, SessionSnapshot, SessionStatus, StepValue};
pub use sessions::{SessionPage, SessionService, SessionServiceError};
