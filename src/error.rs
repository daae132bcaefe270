//! Error types for authgate

use std::io;

use thiserror::Error;

/// Result type alias for authgate
pub type Result<T> = std::result::Result<T, Error>;

/// authgate errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing key generation or persistence error
    #[error("Key error: {0}")]
    Key(String),

    /// No usable authentication back-end
    #[error("Authentication service unavailable: {0}")]
    AuthService(String),

    /// Endpoint discovery failed (client helper)
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Authorization flow error (client helper)
    #[error("Authorization error: {0}")]
    Authorize(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
