//! Error types for the capture-and-match engine.
//!
//! Malformed dataset lines are not errors (they are dropped by the parser),
//! and a missing policy for the active tab is a [`crate::popup::LookupError`]
//! shown in the popup rather than an `Error`.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dataset fetch or document re-fetch failed (transport error or non-success status)
    #[error("Network error: {0}")]
    Network(String),
    /// The key/value store rejected a read or write
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
