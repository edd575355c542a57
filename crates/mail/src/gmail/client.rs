//! Gmail API HTTP client
//!
//! Issues the two read-only list calls (messages, labels) with the stored
//! bearer token and returns the parsed JSON.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;

use super::auth::AccessTokenSource;
use super::params::RequestParams;

/// Gmail API operations the client can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    ListMessages,
    ListLabels,
}

impl ApiMethod {
    /// Discovery-style method id
    pub fn id(self) -> &'static str {
        match self {
            ApiMethod::ListMessages => "gmail.users.messages.list",
            ApiMethod::ListLabels => "gmail.users.labels.list",
        }
    }

    /// Path relative to the API base URL
    pub fn path(self, user_id: &str) -> String {
        let collection = match self {
            ApiMethod::ListMessages => "messages",
            ApiMethod::ListLabels => "labels",
        };
        format!("users/{}/{}", urlencoding::encode(user_id), collection)
    }

    /// Top-level response field holding the listed items
    pub fn response_field(self) -> &'static str {
        match self {
            ApiMethod::ListMessages => "messages",
            ApiMethod::ListLabels => "labels",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Errors returned by the Gmail API boundary
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{method} failed with HTTP status {status}")]
    Status { method: ApiMethod, status: u16 },

    #[error("{method} returned a body that is not JSON")]
    InvalidJson {
        method: ApiMethod,
        #[source]
        source: serde_json::Error,
    },
}

/// Gmail API client
pub struct GmailClient {
    agent: ureq::Agent,
    tokens: Arc<dyn AccessTokenSource>,
    base_url: String,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    pub const APPLICATION_NAME: &'static str = "SMS Gmail Alerts";
    pub const APPLICATION_VERSION: &'static str = "1.0.0";

    /// Create a new Gmail client authorized by `tokens`
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            tokens,
            base_url: Self::BASE_URL.to_string(),
        }
    }

    /// Send requests to a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn user_agent() -> String {
        format!("{}/{}", Self::APPLICATION_NAME, Self::APPLICATION_VERSION)
    }

    /// Issue `method` and parse the response body as JSON
    ///
    /// `userId` defaults to `me` unless `params` supplies one.
    pub fn request(&self, method: ApiMethod, params: &RequestParams) -> Result<Value> {
        let access_token = self.tokens.access_token()?;
        let url = format!("{}/{}", self.base_url, method.path(params.user_id()));
        debug!("{} -> GET {}", method, url);

        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .header("User-Agent", &Self::user_agent());

        for (key, value) in params.query_pairs() {
            request = request.query(key, value);
        }

        let mut response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(status)) => {
                return Err(ApiError::Status { method, status }.into());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("Failed to send {} request", method)));
            }
        };

        let body = response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("Failed to read {} response", method))?;

        serde_json::from_str(&body).map_err(|source| ApiError::InvalidJson { method, source }.into())
    }

    /// List messages; returns the response's `messages` field
    pub fn messages(&self, params: &RequestParams) -> Result<Option<Value>> {
        self.list(ApiMethod::ListMessages, params)
    }

    /// List labels; returns the response's `labels` field
    pub fn labels(&self, params: &RequestParams) -> Result<Option<Value>> {
        self.list(ApiMethod::ListLabels, params)
    }

    fn list(&self, method: ApiMethod, params: &RequestParams) -> Result<Option<Value>> {
        let response = self.request(method, params)?;
        Ok(take_field(response, method.response_field()))
    }
}

/// Remove a top-level field; a missing or null field is `None`
fn take_field(mut value: Value, field: &str) -> Option<Value> {
    value
        .get_mut(field)
        .map(Value::take)
        .filter(|v| !v.is_null())
}

/// Holds a client built on first use and shared afterwards
///
/// Initialization runs at most once even under concurrent first use.
pub struct ClientCell<T> {
    cell: OnceLock<Arc<T>>,
}

impl<T> ClientCell<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Get the client, building it with `init` if this is the first use
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> Arc<T> {
        self.cell.get_or_init(|| Arc::new(init())).clone()
    }

    /// Get the client if it has been built
    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.get().cloned()
    }
}

impl<T> Default for ClientCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
