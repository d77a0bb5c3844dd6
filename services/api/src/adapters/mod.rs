pub mod db;
pub mod oauth;

pub use db::DbAdapter;
pub use oauth::HttpOAuthProvider;
