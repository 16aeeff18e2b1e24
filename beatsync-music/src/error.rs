//! Error types for beatsync-music
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for beatsync-music
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the shared library (timing, config)
    #[error(transparent)]
    Common(#[from] beatsync_common::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sound could not be loaded for playback
    #[error("Cannot load sound {}: {message}", path.display())]
    SoundLoad {
        /// File that failed
        path: PathBuf,
        /// Driver-provided reason
        message: String,
    },

    /// Caller passed unusable playback options
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using beatsync-music Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn sound_load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::SoundLoad {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
