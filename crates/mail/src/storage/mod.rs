//! Token storage
//!
//! The trait-based design allows swapping between in-memory and SQLite
//! storage implementations.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryTokenStore;
pub use sqlite::SqliteTokenStore;
pub use traits::TokenStore;
