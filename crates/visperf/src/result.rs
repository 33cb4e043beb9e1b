//! Result and error types for the visual-diff engine.

use crate::capture::CaptureFault;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations
pub type VisperfResult<T> = Result<T, VisperfError>;

/// Errors that can occur while testing or accepting a subject
#[derive(Debug, Error)]
pub enum VisperfError {
    /// Subject identifier is missing or unsafe to use as a file key
    #[error("Invalid subject {subject:?}: {reason}")]
    InvalidSubject {
        /// Identifier as received
        subject: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Browser or navigation failure that survived the capture retry
    #[error("capture failed for {subject} after {attempts} attempt(s): {source}")]
    CaptureFailed {
        /// Subject being captured
        subject: String,
        /// Number of attempts made
        attempts: u32,
        /// Last fault observed
        #[source]
        source: CaptureFault,
    },

    /// Image bytes could not be decoded
    #[error("Image decode failed: {message}")]
    DecodeError {
        /// Error message
        message: String,
    },

    /// Pixels could not be encoded as PNG
    #[error("Image encode failed: {message}")]
    EncodeError {
        /// Error message
        message: String,
    },

    /// Baseline or diff artifact could not be persisted
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// No baseline stored for the subject
    #[error("No baseline stored for {subject}")]
    BaselineNotFound {
        /// Subject that was looked up
        subject: String,
    },

    /// Accept was requested without candidate image bytes
    #[error("No candidate image supplied for {subject}")]
    MissingCandidate {
        /// Subject being accepted
        subject: String,
    },

    /// A blocking worker was cancelled or panicked
    #[error("Worker task failed: {message}")]
    Task {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VisperfError {
    /// Create a decode error
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeError {
            message: message.into(),
        }
    }

    /// Create an encode error
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::EncodeError {
            message: message.into(),
        }
    }

    /// Whether the caller supplied bad input (as opposed to a server-side failure)
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSubject { .. } | Self::MissingCandidate { .. }
        )
    }
}

impl From<tokio::task::JoinError> for VisperfError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task {
            message: err.to_string(),
        }
    }
}
