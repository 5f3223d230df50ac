//! Error types for the import pipeline.
//!
//! Lower layers return errors; the `Importer` is the only layer that
//! decides whether an error is pipeline-fatal. `Internal` marks
//! programmer/deployment errors (e.g. a required variable missing from a
//! job template) as opposed to user or environment failures.

use thiserror::Error;

/// Result type used throughout disklift.
pub type DiskliftResult<T> = Result<T, DiskliftError>;

/// Error type for disklift operations.
#[derive(Error, Debug)]
pub enum DiskliftError {
    /// Invalid request configuration (bad flags, unsupported OS id).
    /// Reported before any resource is touched.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Cloud API call failure. `code` carries the HTTP status when known,
    /// which lets cleanup paths treat 404 as "already gone".
    #[error("API error{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Api { code: Option<u16>, message: String },

    /// Workflow engine job failure.
    #[error("workflow failed: {0}")]
    Engine(String),

    /// Disk or file inspection failure. Tolerated by some callers.
    #[error("inspection failed: {0}")]
    Inspection(String),

    /// A pipeline step exceeded the shared import deadline.
    #[error("deadline exceeded: {0}")]
    Timeout(String),

    /// The operation was cancelled. Carries the cancellation reason.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Feature not supported in the current configuration.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Programmer error or broken deployment, not user error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiskliftError {
    /// True when this is an API error with HTTP status 404.
    ///
    /// Best-effort cleanup treats a 404 on delete as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiskliftError::Api { code: Some(404), .. })
    }

    /// API error constructor without a status code.
    pub fn api(message: impl Into<String>) -> Self {
        DiskliftError::Api {
            code: None,
            message: message.into(),
        }
    }

    /// API error constructor with an HTTP status code.
    pub fn api_with_code(code: u16, message: impl Into<String>) -> Self {
        DiskliftError::Api {
            code: Some(code),
            message: message.into(),
        }
    }
}
