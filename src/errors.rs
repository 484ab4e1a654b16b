/*!
 * Error types for the subtrans application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when talking to a translation backend
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Map a non-success HTTP status to the matching error variant
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Errors raised by the checkpoint store
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Reading, writing or removing a checkpoint file failed
    #[error("Checkpoint I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The entries could not be serialized
    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A checkpoint file exists but does not contain a readable snapshot
    #[error("Corrupt checkpoint {path:?}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The temporary file could not be renamed over the checkpoint
    #[error("Failed to persist checkpoint {path:?}: {message}")]
    Persist { path: PathBuf, message: String },

    /// The snapshot was written by an incompatible version
    #[error("Unsupported checkpoint version {found} in {path:?}")]
    UnsupportedVersion { path: PathBuf, found: u32 },

    /// The blocking file task did not run to completion
    #[error("Checkpoint task failed: {0}")]
    Task(String),
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// A timecode could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The content contains no usable subtitle entries
    #[error("No valid subtitle entries found")]
    Empty,

    /// Two entries share the same index
    #[error("Duplicate subtitle index {0}")]
    DuplicateIndex(usize),
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error with subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// The run parameters cannot be used
    #[error("Invalid run settings: {0}")]
    InvalidSettings(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from the checkpoint store
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
