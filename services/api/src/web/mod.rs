pub mod auth;
pub mod dto;
pub mod grounding;
pub mod middleware;
pub mod oauth;
pub mod rest;
pub mod restructuring;
pub mod state;

pub use middleware::require_auth;
pub use rest::ApiDoc;
pub use state::AppState;
