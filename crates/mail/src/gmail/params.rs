//! Request parameters for Gmail list calls
//!
//! Parameters are named fields rather than a free-form map. The user id
//! defaults to `me`; a caller-supplied value always wins.

use std::collections::BTreeMap;

/// User id Gmail resolves to the authenticated account
pub const DEFAULT_USER_ID: &str = "me";

/// Names backed by a field; `extra` entries with these names are not sent
const NAMED_PARAMS: [&str; 6] = [
    "userId",
    "maxResults",
    "pageToken",
    "q",
    "labelIds",
    "includeSpamTrash",
];

/// A query parameter value that could not be interpreted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid value for parameter {key}: {value:?}")]
pub struct InvalidParam {
    pub key: String,
    pub value: String,
}

/// Parameters for a Gmail request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    /// Overrides the default `me` user id
    pub user_id: Option<String>,
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
    /// Gmail search query (`q`)
    pub q: Option<String>,
    pub label_ids: Vec<String>,
    pub include_spam_trash: Option<bool>,
    /// Any other query parameters, sent as-is. Use [`RequestParams::set`]
    /// for named parameters.
    pub extra: BTreeMap<String, String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_page_token(mut self, page_token: impl Into<String>) -> Self {
        self.page_token = Some(page_token.into());
        self
    }

    pub fn with_query(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    pub fn with_label_id(mut self, label_id: impl Into<String>) -> Self {
        self.label_ids.push(label_id.into());
        self
    }

    /// The user id this request is issued for
    pub fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(DEFAULT_USER_ID)
    }

    /// Set a parameter by its Gmail API name.
    ///
    /// Known names fill the matching field (so `userId` overrides the
    /// default); unknown names go to `extra`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), InvalidParam> {
        let invalid = || InvalidParam {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "userId" => self.user_id = Some(value.to_string()),
            "maxResults" => self.max_results = Some(value.parse().map_err(|_| invalid())?),
            "pageToken" => self.page_token = Some(value.to_string()),
            "q" => self.q = Some(value.to_string()),
            "labelIds" => self.label_ids.push(value.to_string()),
            "includeSpamTrash" => {
                self.include_spam_trash = Some(match value {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => return Err(invalid()),
                })
            }
            _ => {
                self.extra.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Build parameters from decoded query-string pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, InvalidParam>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.set(key.as_ref(), value.as_ref())?;
        }
        Ok(params)
    }

    /// Every outbound parameter, `userId` first
    pub fn to_parameters(&self) -> Vec<(String, String)> {
        let mut out = vec![("userId".to_string(), self.user_id().to_string())];
        out.extend(self.query_pairs());
        out
    }

    /// Parameters sent in the query string (`userId` travels in the path)
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();

        if let Some(max) = self.max_results {
            out.push(("maxResults".to_string(), max.to_string()));
        }
        if let Some(token) = &self.page_token {
            out.push(("pageToken".to_string(), token.clone()));
        }
        if let Some(q) = &self.q {
            out.push(("q".to_string(), q.clone()));
        }
        for label in &self.label_ids {
            out.push(("labelIds".to_string(), label.clone()));
        }
        if let Some(include) = self.include_spam_trash {
            out.push(("includeSpamTrash".to_string(), include.to_string()));
        }
        for (key, value) in &self.extra {
            if NAMED_PARAMS.contains(&key.as_str()) {
                continue;
            }
            out.push((key.clone(), value.clone()));
        }

        out
    }
}
