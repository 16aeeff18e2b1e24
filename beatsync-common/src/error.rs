//! Common error types for beatsync

use thiserror::Error;

/// Common result type for beatsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the beatsync crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Timing file could not be parsed
    #[error("Timing parse error in {path}: {message}")]
    TimingParse {
        /// File being parsed
        path: String,
        /// What went wrong
        message: String,
    },

    /// Timing data failed validation (bad BPM, negative stop, ...)
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the "resource absent" case, which callers treat as a quiet fallback
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(Error::NotFound("song.sm".to_string()).is_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::from(io).is_not_found());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(!Error::from(denied).is_not_found());

        assert!(!Error::InvalidTiming("bpm 0".to_string()).is_not_found());
    }

    #[test]
    fn test_timing_parse_display() {
        let err = Error::TimingParse {
            path: "songs/a.sm".to_string(),
            message: "bad #BPMS".to_string(),
        };
        assert_eq!(err.to_string(), "Timing parse error in songs/a.sm: bad #BPMS");
    }
}
