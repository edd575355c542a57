//! Server settings
//!
//! Resolved from defaults, then ~/.config/gmail-alerts/settings.json, then
//! environment variables (`ALERTS_BIND`, `ALERTS_PUBLIC_URL`,
//! `ALERTS_DATABASE`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "tokens.sqlite";
const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// `ALERTS_DATABASE` value selecting the in-memory store
const MEMORY_DATABASE: &str = ":memory:";

/// Optional overrides read from settings.json
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    bind: Option<String>,
    public_url: Option<String>,
    database: Option<String>,
}

/// Where tokens are persisted
#[derive(Debug, Clone, PartialEq)]
pub enum Database {
    Sqlite(PathBuf),
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Address the HTTP server listens on
    pub bind: String,
    /// External base URL, used to build the OAuth redirect URI
    pub public_url: String,
    pub database: Database,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let file = if config::config_exists(SETTINGS_FILE) {
            config::load_json(SETTINGS_FILE)?
        } else {
            SettingsFile::default()
        };

        Self::resolve(file, config::env_var)
    }

    fn resolve(file: SettingsFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind = env("ALERTS_BIND")
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let public_url = env("ALERTS_PUBLIC_URL")
            .or(file.public_url)
            .unwrap_or_else(|| format!("http://{}", bind));

        let database = match env("ALERTS_DATABASE").or(file.database) {
            Some(value) if value == MEMORY_DATABASE => Database::Memory,
            Some(path) => Database::Sqlite(PathBuf::from(path)),
            None => Database::Sqlite(
                config::config_path(DATABASE_FILE).context("Could not determine config directory")?,
            ),
        };

        Ok(Self {
            bind,
            public_url: public_url.trim_end_matches('/').to_string(),
            database,
        })
    }

    /// Callback URL registered with Google
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/google_oauth2/callback", self.public_url)
    }
}
