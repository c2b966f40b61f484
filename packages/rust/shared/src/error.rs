//! Error types for noteforge.
//!
//! Library crates use [`NoteforgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all noteforge operations.
#[derive(Debug, thiserror::Error)]
pub enum NoteforgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching transcript content.
    #[error("network error: {0}")]
    Network(String),

    /// Transcript or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A chunk could not be resolved by the completion service after all retries.
    #[error("chunk {position}/{total} failed: {message}")]
    ChunkFailed {
        position: usize,
        total: usize,
        message: String,
    },

    /// A whole-document completion (summary, mind map) failed after all retries.
    #[error("completion failed: {message}")]
    Completion { message: String },

    /// Model output could not be turned into a valid artifact.
    #[error("extraction failed: {message}")]
    Extraction { message: String },

    /// The input is unusable as-is; retrying will not help.
    #[error("input error: {message}")]
    Input { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NoteforgeError>;

impl NoteforgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a completion error from the last attempt's failure.
    pub fn completion(msg: impl Into<String>) -> Self {
        Self::Completion {
            message: msg.into(),
        }
    }

    /// Create an extraction error (malformed model output).
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction {
            message: msg.into(),
        }
    }

    /// Create an input error (the record should be skipped).
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means "nothing to do" rather than a failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Input { .. })
    }
}
