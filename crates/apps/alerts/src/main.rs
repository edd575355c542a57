//! Gmail Alerts - sign in with Google and read Gmail messages and labels
//!
//! This is the main entry point for the alerts server.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use mail::{GmailCredentials, GoogleOAuth, InMemoryTokenStore, SqliteTokenStore, TokenStore};

mod server;
mod settings;

use server::AppState;
use settings::{Database, Settings};

fn open_store(database: &Database) -> Result<Arc<dyn TokenStore>> {
    match database {
        Database::Sqlite(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            info!("Using token database at {}", path.display());
            Ok(Arc::new(SqliteTokenStore::new(path)?))
        }
        Database::Memory => {
            warn!("Using in-memory token store; tokens are lost on restart");
            Ok(Arc::new(InMemoryTokenStore::new()))
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let settings = Settings::load()?;

    let credentials = match GmailCredentials::load() {
        Ok(creds) => creds,
        Err(e) => {
            if let Some(path) = GmailCredentials::default_credentials_path() {
                warn!(
                    "To configure Google sign-in, either:\n\
                     1. Set environment variables: CLIENT_ID and CLIENT_SECRET\n\
                     2. Or place your Google OAuth credentials at: {}",
                    path.display()
                );
            }
            return Err(e);
        }
    };

    let store = open_store(&settings.database)?;
    let oauth = Arc::new(GoogleOAuth::new(credentials, settings.redirect_uri()));
    info!("OAuth redirect URI: {}", oauth.redirect_uri());

    let state = AppState::new(store, oauth);
    server::run(&state, &settings.bind)
}
