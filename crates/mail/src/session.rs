//! OAuth callback handling
//!
//! Turns the identity provider's callback payload into a stored token.
//! The payload follows the OmniAuth auth-hash layout:
//!
//! ```json
//! {
//!   "provider": "google_oauth2",
//!   "uid": "1234",
//!   "info": { "email": "user@example.com" },
//!   "credentials": { "token": "...", "refresh_token": "...", "expires_at": 1700000000, "expires": true }
//! }
//! ```

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::models::{Credentials, Token, expires_at_from_timestamp};
use crate::storage::TokenStore;

/// Provider name reported in auth hashes built by this crate
pub const PROVIDER: &str = "google_oauth2";

/// Errors raised while accepting callback data
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("OAuth callback is missing required field: {0}")]
    MissingField(&'static str),

    #[error("OAuth callback payload is not valid: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("OAuth callback has an out-of-range expires_at: {0}")]
    InvalidExpiry(i64),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Callback payload from the identity provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthHash {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub info: AuthInfo,
    #[serde(default)]
    pub credentials: AuthCredentials,
}

/// Identity details of the authenticated account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Token portion of the callback payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthCredentials {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires: bool,
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, SessionError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(SessionError::MissingField(field))
}

impl AuthHash {
    /// Parse a raw JSON payload
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The account email the token belongs to
    pub fn email(&self) -> Result<&str, SessionError> {
        required(&self.info.email, "info.email")
    }

    /// Extract the credentials to store
    pub fn to_credentials(&self) -> Result<Credentials, SessionError> {
        let mut credentials = Credentials::new(required(&self.credentials.token, "credentials.token")?);

        if let Some(refresh_token) = &self.credentials.refresh_token {
            credentials = credentials.with_refresh_token(refresh_token.clone());
        }

        if let Some(secs) = self.credentials.expires_at {
            let expires_at =
                expires_at_from_timestamp(secs).map_err(|_| SessionError::InvalidExpiry(secs))?;
            credentials = credentials.with_expires_at(expires_at);
        }

        Ok(credentials)
    }
}

/// Writes callback credentials into the token store
pub struct SessionHandler {
    store: Arc<dyn TokenStore>,
}

impl SessionHandler {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Create or update the token record for the authenticated account
    pub fn create(&self, auth: &AuthHash) -> Result<Token, SessionError> {
        let email = auth.email()?;
        let credentials = auth.to_credentials()?;

        let token = self.store.create(email, &credentials)?;
        info!(
            "Stored OAuth token for {} (refresh token: {})",
            token.email,
            if token.refresh_token.is_some() { "present" } else { "absent" }
        );

        Ok(token)
    }

    /// Parse a raw callback payload and store it
    pub fn create_from_json(&self, json: &str) -> Result<Token, SessionError> {
        self.create(&AuthHash::from_json(json)?)
    }
}
