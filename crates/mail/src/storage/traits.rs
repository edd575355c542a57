//! Storage trait definitions

use crate::models::{Credentials, Token};
use anyhow::Result;

/// Trait for token storage operations
///
/// Records are keyed by email. Implementations must never replace a stored
/// refresh token with an absent or empty one.
pub trait TokenStore: Send + Sync {
    /// Insert or update the record for `email` and return it as stored
    fn create(&self, email: &str, credentials: &Credentials) -> Result<Token>;

    /// Get the record for an email
    fn find_by_email(&self, email: &str) -> Result<Option<Token>>;

    /// Get the most recently updated record
    fn latest(&self) -> Result<Option<Token>>;

    /// List all records, most recently updated first
    fn list(&self) -> Result<Vec<Token>>;

    /// Delete the record for an email, returning whether one existed
    fn delete(&self, email: &str) -> Result<bool>;

    /// Current access token of the most recently updated record
    fn access_token(&self) -> Result<Option<String>> {
        Ok(self.latest()?.map(|t| t.token))
    }
}
