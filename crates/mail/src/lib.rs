//! Mail crate - OAuth token lifecycle and Gmail access
//!
//! This crate provides:
//! - The stored OAuth token model and its storage backends
//! - A session handler turning OAuth callback payloads into stored tokens
//! - A Google OAuth2 client with access-token refresh
//! - A Gmail API client wrapping the list-messages and list-labels calls

pub mod config;
pub mod gmail;
pub mod models;
pub mod session;
pub mod storage;

pub use config::GmailCredentials;
pub use gmail::{
    AccessTokenSource, ApiError, ApiMethod, ClientCell, GmailClient, GoogleOAuth, OAuthEndpoints,
    RequestParams, StaticToken, TokenError, TokenManager,
};
pub use models::{Credentials, Token};
pub use session::{AuthHash, SessionError, SessionHandler};
pub use storage::{InMemoryTokenStore, SqliteTokenStore, TokenStore};
