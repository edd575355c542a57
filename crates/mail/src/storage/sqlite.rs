//! SQLite-based token storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::TokenStore;
use crate::models::{Credentials, Token};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL,
                token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX idx_tokens_email ON tokens(email);
            "#,
        ),
        // Migration 2: Index for "most recently updated" lookups
        M::up("CREATE INDEX idx_tokens_updated_at ON tokens(updated_at DESC);"),
    ])
}

const SELECT_COLUMNS: &str =
    "SELECT id, email, token, refresh_token, expires_at, created_at, updated_at FROM tokens";

/// Fixed-width RFC 3339 so stored timestamps sort lexically
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in tokens table: {}", value))
}

/// Raw column values for one tokens row
struct TokenRow {
    id: i64,
    email: String,
    token: String,
    refresh_token: Option<String>,
    expires_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TokenRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            token: row.get(2)?,
            refresh_token: row.get(3)?,
            expires_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_token(self) -> Result<Token> {
        Ok(Token {
            id: self.id,
            email: self.email,
            token: self.token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// SQLite-based token storage
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Open (or create) the token database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets readers proceed while the callback handler writes
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_one(conn: &Connection, sql: &str, email: Option<&str>) -> Result<Option<Token>> {
        let row = match email {
            Some(email) => conn.query_row(sql, [email], TokenRow::from_row),
            None => conn.query_row(sql, [], TokenRow::from_row),
        }
        .optional()?;

        row.map(TokenRow::into_token).transpose()
    }
}

impl TokenStore for SqliteTokenStore {
    fn create(&self, email: &str, credentials: &Credentials) -> Result<Token> {
        credentials.check_expiry()?;

        let conn = self.conn.lock().unwrap();
        let now = format_timestamp(&Utc::now());

        // COALESCE keeps the stored refresh token when none is supplied
        conn.execute(
            "INSERT INTO tokens (email, token, refresh_token, expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(email) DO UPDATE SET
                token = excluded.token,
                refresh_token = COALESCE(excluded.refresh_token, tokens.refresh_token),
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![
                email,
                credentials.token,
                credentials.refresh_token(),
                credentials.expires_at.as_ref().map(format_timestamp),
                now,
            ],
        )
        .with_context(|| format!("Failed to store token for {}", email))?;

        Self::query_one(
            &conn,
            &format!("{} WHERE email = ?", SELECT_COLUMNS),
            Some(email),
        )?
        .context("Token missing after insert")
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Token>> {
        let conn = self.conn.lock().unwrap();
        Self::query_one(
            &conn,
            &format!("{} WHERE email = ?", SELECT_COLUMNS),
            Some(email),
        )
    }

    fn latest(&self) -> Result<Option<Token>> {
        let conn = self.conn.lock().unwrap();
        Self::query_one(
            &conn,
            &format!("{} ORDER BY updated_at DESC, id DESC LIMIT 1", SELECT_COLUMNS),
            None,
        )
    }

    fn list(&self) -> Result<Vec<Token>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY updated_at DESC, id DESC",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], TokenRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(TokenRow::into_token).collect()
    }

    fn delete(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM tokens WHERE email = ?", [email])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExpiryOutOfRange;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteTokenStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("tokens.test.sqlite");
        let store = SqliteTokenStore::new(&db_path).unwrap();
        (store, dir)
    }

    #[test]
    fn test_migrations_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn test_create_stores_exact_fields() {
        let (store, _dir) = create_test_store();
        let expires_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let creds = Credentials::new("abc")
            .with_refresh_token("refresh")
            .with_expires_at(expires_at);

        let stored = store.create("user@example.com", &creds).unwrap();
        assert!(stored.id > 0);
        assert_eq!(stored.email, "user@example.com");
        assert_eq!(stored.token, "abc");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(stored.expires_at, Some(expires_at));
    }

    #[test]
    fn test_upsert_preserves_refresh_token() {
        let (store, _dir) = create_test_store();
        let first = store
            .create("user@example.com", &Credentials::new("a").with_refresh_token("r"))
            .unwrap();

        let second = store
            .create("user@example.com", &Credentials::new("b").with_refresh_token(""))
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.token, "b");
        assert_eq!(second.refresh_token.as_deref(), Some("r"));
        assert_eq!(second.created_at, first.created_at);

        let third = store
            .create("user@example.com", &Credentials::new("c").with_refresh_token("r2"))
            .unwrap();
        assert_eq!(third.refresh_token.as_deref(), Some("r2"));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_latest_and_access_token() {
        let (store, _dir) = create_test_store();
        assert!(store.access_token().unwrap().is_none());

        store.create("a@example.com", &Credentials::new("token-a")).unwrap();
        store.create("b@example.com", &Credentials::new("token-b")).unwrap();
        assert_eq!(store.access_token().unwrap().as_deref(), Some("token-b"));

        store.create("a@example.com", &Credentials::new("token-a2")).unwrap();
        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.email, "a@example.com");
        assert_eq!(latest.token, "token-a2");
    }

    #[test]
    fn test_delete() {
        let (store, _dir) = create_test_store();
        store.create("a@example.com", &Credentials::new("a")).unwrap();

        assert!(store.delete("a@example.com").unwrap());
        assert!(!store.delete("a@example.com").unwrap());
        assert!(store.find_by_email("a@example.com").unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("tokens.test.sqlite");

        {
            let store = SqliteTokenStore::new(&db_path).unwrap();
            store
                .create("user@example.com", &Credentials::new("abc").with_refresh_token("r"))
                .unwrap();
        }

        let store = SqliteTokenStore::new(&db_path).unwrap();
        let token = store.find_by_email("user@example.com").unwrap().unwrap();
        assert_eq!(token.token, "abc");
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_out_of_range_expiry_not_written() {
        let (store, _dir) = create_test_store();
        store.create("other@example.com", &Credentials::new("other")).unwrap();

        let far = DateTime::from_timestamp(253_402_300_800, 0).unwrap();
        let err = store
            .create("user@example.com", &Credentials::new("abc").with_expires_at(far))
            .unwrap_err();
        assert!(err.downcast_ref::<ExpiryOutOfRange>().is_some());

        assert!(store.find_by_email("user@example.com").unwrap().is_none());
        assert_eq!(store.latest().unwrap().unwrap().email, "other@example.com");
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_in_memory() {
        let store = SqliteTokenStore::open_in_memory().unwrap();
        store.create("user@example.com", &Credentials::new("abc")).unwrap();
        assert_eq!(store.access_token().unwrap().as_deref(), Some("abc"));
    }
}
