//! Error types for chatdesk

use std::io;
use thiserror::Error;

/// Result type alias for chatdesk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chatdesk
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem and terminal I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization errors for persisted conversations
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport errors talking to the reply endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The reply endpoint answered but not with a usable reply
    #[error("API error: {0}")]
    Api(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// System clipboard errors
    #[error("Clipboard error: {0}")]
    Clipboard(String),
}

impl From<arboard::Error> for Error {
    fn from(err: arboard::Error) -> Self {
        Self::Clipboard(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}
