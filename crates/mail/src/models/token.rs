//! OAuth token model

use chrono::{DateTime, Duration, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Access tokens expiring within this window are treated as expired
pub const EXPIRY_BUFFER_SECS: i64 = 300;

/// Latest storable expiry, 9999-12-31T23:59:59Z (RFC 3339 has four-digit years)
pub const MAX_EXPIRES_AT_SECS: i64 = 253_402_300_799;

/// An expiry the token stores cannot represent
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Token expiry is out of range: {0} (Unix seconds)")]
pub struct ExpiryOutOfRange(pub i64);

fn expiry_in_range(expires_at: &DateTime<Utc>) -> bool {
    (0..=MAX_EXPIRES_AT_SECS).contains(&expires_at.timestamp())
}

/// Expiry from Unix seconds, if it falls between the epoch and year 9999
pub fn expires_at_from_timestamp(secs: i64) -> Result<DateTime<Utc>, ExpiryOutOfRange> {
    DateTime::from_timestamp(secs, 0)
        .filter(expiry_in_range)
        .ok_or(ExpiryOutOfRange(secs))
}

/// Stored OAuth credentials for one Google account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Database row id (0 until stored)
    pub id: i64,
    /// Email of the authenticated account, unique per store
    pub email: String,
    /// Current OAuth access token
    pub token: String,
    /// Long-lived credential used to mint new access tokens
    pub refresh_token: Option<String>,
    /// When `token` stops being valid; `None` means no known expiry
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    /// Build a new, not yet stored record from callback credentials
    pub fn new(email: impl Into<String>, credentials: &Credentials) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            email: email.into(),
            token: credentials.token.clone(),
            refresh_token: credentials.refresh_token().map(str::to_string),
            expires_at: credentials.expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply newer credentials to this record.
    ///
    /// The refresh token is only replaced by a non-empty value.
    pub fn apply(&mut self, credentials: &Credentials) {
        self.token = credentials.token.clone();
        if let Some(refresh_token) = credentials.refresh_token() {
            self.refresh_token = Some(refresh_token.to_string());
        }
        self.expires_at = credentials.expires_at;
        self.updated_at = Utc::now();
    }

    /// Whether the access token is expired (or about to) at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + Duration::seconds(EXPIRY_BUFFER_SECS),
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Credentials delivered by the identity provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set expiry from a lifetime in seconds, as token endpoints report it.
    ///
    /// Returns `None` when the resulting expiry is not storable.
    pub fn with_expires_in(self, expires_in: u64) -> Option<Self> {
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .filter(expiry_in_range)?;
        Some(self.with_expires_at(expires_at))
    }

    /// Fail if `expires_at` is outside the storable range
    pub fn check_expiry(&self) -> Result<(), ExpiryOutOfRange> {
        match &self.expires_at {
            Some(expires_at) if !expiry_in_range(expires_at) => {
                Err(ExpiryOutOfRange(expires_at.timestamp()))
            }
            _ => Ok(()),
        }
    }

    /// The refresh token, if present and non-empty
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_copies_credentials() {
        let expires_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let creds = Credentials::new("abc")
            .with_refresh_token("refresh")
            .with_expires_at(expires_at);

        let token = Token::new("user@example.com", &creds);
        assert_eq!(token.id, 0);
        assert_eq!(token.email, "user@example.com");
        assert_eq!(token.token, "abc");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(token.expires_at, Some(expires_at));
    }

    #[test]
    fn test_apply_keeps_refresh_token() {
        let mut token = Token::new("user@example.com", &Credentials::new("a").with_refresh_token("r1"));

        token.apply(&Credentials::new("b"));
        assert_eq!(token.token, "b");
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));

        token.apply(&Credentials::new("c").with_refresh_token(""));
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));

        token.apply(&Credentials::new("d").with_refresh_token("r2"));
        assert_eq!(token.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut token = Token::new("user@example.com", &Credentials::new("a"));
        assert!(!token.is_expired_at(now));

        token.expires_at = Some(now + Duration::hours(1));
        assert!(!token.is_expired_at(now));

        // Inside the buffer window
        token.expires_at = Some(now + Duration::seconds(60));
        assert!(token.is_expired_at(now));

        token.expires_at = Some(now - Duration::seconds(1));
        assert!(token.is_expired_at(now));
    }

    #[test]
    fn test_credentials_deserialize_unix_seconds() {
        let creds: Credentials = serde_json::from_str(
            r#"{"token": "abc", "refresh_token": "r", "expires_at": 1700000000}"#,
        )
        .unwrap();
        assert_eq!(creds.token, "abc");
        assert_eq!(creds.refresh_token(), Some("r"));
        assert_eq!(creds.expires_at.unwrap().timestamp(), 1_700_000_000);

        let creds: Credentials = serde_json::from_str(r#"{"token": "abc"}"#).unwrap();
        assert!(creds.refresh_token().is_none());
        assert!(creds.expires_at.is_none());
    }

    #[test]
    fn test_expires_in() {
        let creds = Credentials::new("abc").with_expires_in(3600).unwrap();
        let remaining = creds.expires_at.unwrap() - Utc::now();
        assert!(remaining > Duration::seconds(3500));
        assert!(creds.check_expiry().is_ok());

        // Past year 9999, past chrono's TimeDelta range, and past i64
        assert!(Credentials::new("abc").with_expires_in(300_000_000_000).is_none());
        assert!(Credentials::new("abc").with_expires_in(10_000_000_000_000_000).is_none());
        assert!(Credentials::new("abc").with_expires_in(u64::MAX).is_none());
    }

    #[test]
    fn test_expiry_range() {
        assert!(expires_at_from_timestamp(1_700_000_000).is_ok());
        assert!(expires_at_from_timestamp(MAX_EXPIRES_AT_SECS).is_ok());
        assert_eq!(
            expires_at_from_timestamp(MAX_EXPIRES_AT_SECS + 1),
            Err(ExpiryOutOfRange(MAX_EXPIRES_AT_SECS + 1))
        );
        assert!(expires_at_from_timestamp(-1).is_err());
        assert!(expires_at_from_timestamp(i64::MAX).is_err());

        let far = DateTime::from_timestamp(MAX_EXPIRES_AT_SECS + 1, 0).unwrap();
        let creds = Credentials::new("abc").with_expires_at(far);
        assert_eq!(creds.check_expiry(), Err(ExpiryOutOfRange(MAX_EXPIRES_AT_SECS + 1)));
        assert!(Credentials::new("abc").check_expiry().is_ok());
    }
}
