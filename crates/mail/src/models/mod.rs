//! Domain models

mod token;

pub use token::{
    Credentials, EXPIRY_BUFFER_SECS, ExpiryOutOfRange, MAX_EXPIRES_AT_SECS, Token,
    expires_at_from_timestamp,
};
