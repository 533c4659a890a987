//! Error types for Invoice-View

use thiserror::Error;

/// Result type alias for Invoice-View operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Invoice-View
///
/// Errors are `Clone` so a single failure can be handed to every demander of
/// a shared fetch and replayed on observed streams.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Network or server failure on fetch, create or delete
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote target of an operation does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A command bus or background driver has shut down
    #[error("Channel closed: {0}")]
    Closed(String),

    /// No async runtime available to drive background stages
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            Error::NotFound(e.to_string())
        } else {
            Error::Transport(e.to_string())
        }
    }
}
