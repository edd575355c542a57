//! Google OAuth2 identity provider client and access-token management
//!
//! `GoogleOAuth` speaks to Google's authorization, token, and userinfo
//! endpoints. `TokenManager` hands out the stored access token, refreshing
//! it first when it has expired.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;

use crate::config::GmailCredentials;
use crate::models::{Credentials, Token};
use crate::session::{AuthCredentials, AuthHash, AuthInfo, PROVIDER};
use crate::storage::TokenStore;

/// Scopes requested at consent time
pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/gmail.readonly",
];

/// Google OAuth2 endpoint URLs
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
        }
    }
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_credentials(self) -> Result<Credentials> {
        let mut credentials = Credentials::new(self.access_token);
        if let Some(refresh_token) = self.refresh_token {
            credentials = credentials.with_refresh_token(refresh_token);
        }
        if let Some(expires_in) = self.expires_in {
            credentials = credentials.with_expires_in(expires_in).with_context(|| {
                format!("Token response has an out-of-range expires_in: {}", expires_in)
            })?;
        }
        Ok(credentials)
    }
}

/// Userinfo response from Google
#[derive(Debug, Deserialize)]
struct UserInfo {
    id: Option<String>,
    email: String,
    name: Option<String>,
}

/// OAuth2 client for the Google identity provider
pub struct GoogleOAuth {
    credentials: GmailCredentials,
    redirect_uri: String,
    endpoints: OAuthEndpoints,
    agent: ureq::Agent,
}

impl GoogleOAuth {
    /// Create a client for the given OAuth app and callback URL
    pub fn new(credentials: GmailCredentials, redirect_uri: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build();

        Self {
            credentials,
            redirect_uri: redirect_uri.into(),
            endpoints: OAuthEndpoints::default(),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    /// Point the client at different endpoints
    pub fn with_endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Consent URL the user is redirected to
    ///
    /// Requests offline access so Google issues a refresh token.
    pub fn authorization_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            self.endpoints.auth_url,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&SCOPES.join(" ")),
        )
    }

    /// Exchange an authorization code for tokens
    pub fn exchange_code(&self, code: &str) -> Result<Credentials> {
        let mut response = self
            .agent
            .post(&self.endpoints.token_url)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .context("Failed to exchange authorization code")?;

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")?;

        token.into_credentials()
    }

    /// Mint a new access token from a refresh token
    ///
    /// Google usually omits the refresh token from this response; the one
    /// passed in is carried over in that case.
    pub fn refresh(&self, refresh_token: &str) -> Result<Credentials> {
        let mut response = self
            .agent
            .post(&self.endpoints.token_url)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse refresh token response")?;

        let mut credentials = token.into_credentials()?;
        if credentials.refresh_token().is_none() {
            credentials.refresh_token = Some(refresh_token.to_string());
        }

        Ok(credentials)
    }

    fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let mut response = self
            .agent
            .get(&self.endpoints.userinfo_url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to fetch user info")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse user info response")
    }

    /// Email address of the account an access token belongs to
    pub fn fetch_email(&self, access_token: &str) -> Result<String> {
        Ok(self.fetch_user_info(access_token)?.email)
    }

    /// Complete the authorization-code flow and build the callback payload
    pub fn callback(&self, code: &str) -> Result<AuthHash> {
        let credentials = self.exchange_code(code)?;
        let user = self.fetch_user_info(&credentials.token)?;

        Ok(AuthHash {
            provider: PROVIDER.to_string(),
            uid: user.id,
            info: AuthInfo {
                email: Some(user.email),
                name: user.name,
            },
            credentials: AuthCredentials {
                token: Some(credentials.token),
                refresh_token: credentials.refresh_token,
                expires_at: credentials.expires_at.map(|t| t.timestamp()),
                expires: credentials.expires_at.is_some(),
            },
        })
    }
}

/// Errors raised when no usable access token is available
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("No OAuth token stored; sign in first")]
    NotFound,

    #[error("Access token for {email} expired and cannot be refreshed")]
    Expired { email: String },
}

/// Source of bearer tokens for API calls
pub trait AccessTokenSource: Send + Sync {
    fn access_token(&self) -> Result<String>;
}

/// A fixed bearer token
pub struct StaticToken(pub String);

impl AccessTokenSource for StaticToken {
    fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Hands out the stored access token, refreshing it when expired
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    oauth: Option<Arc<GoogleOAuth>>,
    email: Option<String>,
}

impl TokenManager {
    /// Use the most recently updated token in `store`
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            oauth: None,
            email: None,
        }
    }

    /// Enable refreshing expired tokens through `oauth`
    pub fn with_refresh(mut self, oauth: Arc<GoogleOAuth>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// Pin the manager to one account instead of the latest record
    pub fn for_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    fn current(&self) -> Result<Option<Token>> {
        match &self.email {
            Some(email) => self.store.find_by_email(email),
            None => self.store.latest(),
        }
    }
}

impl AccessTokenSource for TokenManager {
    fn access_token(&self) -> Result<String> {
        let token = self.current()?.ok_or(TokenError::NotFound)?;
        if !token.is_expired() {
            return Ok(token.token);
        }

        let refresh_token = token.refresh_token.as_deref().filter(|t| !t.is_empty());
        let (Some(oauth), Some(refresh_token)) = (&self.oauth, refresh_token) else {
            warn!("Access token for {} expired and no refresh is possible", token.email);
            return Err(TokenError::Expired { email: token.email }.into());
        };

        info!("Refreshing expired access token for {}", token.email);
        let credentials = oauth
            .refresh(refresh_token)
            .with_context(|| format!("Failed to refresh access token for {}", token.email))?;
        let refreshed = self.store.create(&token.email, &credentials)?;

        Ok(refreshed.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTokenStore;
    use chrono::{Duration as ChronoDuration, Utc};

    fn oauth() -> GoogleOAuth {
        GoogleOAuth::new(
            GmailCredentials {
                client_id: "client id".to_string(),
                client_secret: "secret".to_string(),
            },
            "http://localhost:3000/auth/google_oauth2/callback",
        )
    }

    #[test]
    fn test_authorization_url() {
        let url = oauth().authorization_url();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fgoogle_oauth2%2Fcallback"
        ));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("gmail.readonly"));
        assert!(url.contains("userinfo.email"));
    }

    #[test]
    fn test_token_response_conversion() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token": "abc", "expires_in": 3600, "token_type": "Bearer"}"#,
        )
        .unwrap();
        let creds = response.into_credentials().unwrap();
        assert_eq!(creds.token, "abc");
        assert!(creds.refresh_token().is_none());

        let remaining = creds.expires_at.unwrap() - Utc::now();
        assert!(remaining > ChronoDuration::seconds(3500));
    }

    #[test]
    fn test_token_response_with_huge_expires_in() {
        for expires_in in ["300000000000", "10000000000000000", "18446744073709551615"] {
            let response: TokenResponse = serde_json::from_str(&format!(
                r#"{{"access_token": "abc", "expires_in": {}}}"#,
                expires_in
            ))
            .unwrap();
            let err = response.into_credentials().unwrap_err();
            assert!(err.to_string().contains("out-of-range expires_in"));
        }
    }

    #[test]
    fn test_manager_without_token() {
        let manager = TokenManager::new(Arc::new(InMemoryTokenStore::new()));
        let err = manager.access_token().unwrap_err();
        assert!(matches!(err.downcast_ref::<TokenError>(), Some(TokenError::NotFound)));
    }

    #[test]
    fn test_manager_returns_valid_token() {
        let store = Arc::new(InMemoryTokenStore::new());
        store
            .create(
                "user@example.com",
                &Credentials::new("abc").with_expires_at(Utc::now() + ChronoDuration::hours(1)),
            )
            .unwrap();

        let manager = TokenManager::new(store);
        assert_eq!(manager.access_token().unwrap(), "abc");
    }

    #[test]
    fn test_manager_pinned_to_email() {
        let store = Arc::new(InMemoryTokenStore::new());
        store.create("a@example.com", &Credentials::new("token-a")).unwrap();
        store.create("b@example.com", &Credentials::new("token-b")).unwrap();

        let manager = TokenManager::new(store.clone()).for_email("a@example.com");
        assert_eq!(manager.access_token().unwrap(), "token-a");

        let manager = TokenManager::new(store).for_email("c@example.com");
        assert!(manager.access_token().is_err());
    }

    #[test]
    fn test_manager_expired_without_refresh() {
        let store = Arc::new(InMemoryTokenStore::new());
        store
            .create(
                "user@example.com",
                &Credentials::new("abc")
                    .with_refresh_token("refresh")
                    .with_expires_at(Utc::now() - ChronoDuration::minutes(1)),
            )
            .unwrap();

        // No OAuth client configured, so refresh is impossible
        let manager = TokenManager::new(store);
        let err = manager.access_token().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TokenError>(),
            Some(TokenError::Expired { email }) if email == "user@example.com"
        ));
    }

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken("abc".to_string()).access_token().unwrap(), "abc");
    }
}
