//! Gmail API integration
//!
//! This module provides:
//! - Google OAuth2 client and access-token management
//! - Request parameters with a `me` user id default
//! - Gmail API client for listing messages and labels

mod auth;
mod client;
mod params;

pub use auth::{
    AccessTokenSource, GoogleOAuth, OAuthEndpoints, SCOPES, StaticToken, TokenError, TokenManager,
};
pub use client::{ApiError, ApiMethod, ClientCell, GmailClient};
pub use params::{DEFAULT_USER_ID, InvalidParam, RequestParams};
