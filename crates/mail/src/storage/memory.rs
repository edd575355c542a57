//! In-memory storage implementation
//!
//! Used in tests and for runs that do not need tokens to survive a restart.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use super::TokenStore;
use crate::models::{Credentials, Token};

/// In-memory implementation of TokenStore
///
/// Records are held in a HashMap keyed by email. Each write stamps a
/// sequence number so `latest` is stable even when timestamps collide.
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, (u64, Token)>>,
    next_id: AtomicI64,
    sequence: AtomicU64,
}

impl InMemoryTokenStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            sequence: AtomicU64::new(0),
        }
    }

    fn sorted(&self) -> Vec<Token> {
        let tokens = self.tokens.read().unwrap();
        let mut entries: Vec<_> = tokens.values().cloned().collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, token)| token).collect()
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn create(&self, email: &str, credentials: &Credentials) -> Result<Token> {
        credentials.check_expiry()?;

        let mut tokens = self.tokens.write().unwrap();
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);

        let token = match tokens.remove(email) {
            Some((_, mut existing)) => {
                existing.apply(credentials);
                existing
            }
            None => {
                let mut token = Token::new(email, credentials);
                token.id = self.next_id.fetch_add(1, Ordering::SeqCst);
                token
            }
        };

        tokens.insert(email.to_string(), (seq, token.clone()));
        Ok(token)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Token>> {
        let tokens = self.tokens.read().unwrap();
        Ok(tokens.get(email).map(|(_, token)| token.clone()))
    }

    fn latest(&self) -> Result<Option<Token>> {
        Ok(self.sorted().into_iter().next())
    }

    fn list(&self) -> Result<Vec<Token>> {
        Ok(self.sorted())
    }

    fn delete(&self, email: &str) -> Result<bool> {
        let mut tokens = self.tokens.write().unwrap();
        Ok(tokens.remove(email).is_some())
    }
}
