//! Error types for RP Manager core.

use thiserror::Error;

/// Core error type.
///
/// The first four variants are the user-facing taxonomy: how a failed
/// operation should be explained and whether it can be retried. The rest are
/// infrastructure failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The credential is missing or was rejected by the device.
    #[error("Invalid or missing API key for {device}")]
    Unauthorized { device: String },

    /// Network error, timeout, or a non-auth error status from the device.
    #[error("Device {device} is unreachable: {reason}")]
    Unreachable { device: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True when re-entering the API key is the way out.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized { .. })
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Unreachable { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Local store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access storage directory: {0}")]
    DirectoryAccess(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
