//! Error taxonomy for step execution.

use thiserror::Error;

/// Errors raised while preparing or performing a step.
///
/// Executors turn every non-fatal variant into a failed response, so a
/// broken step never stops the remaining steps of a run. Only
/// [`EngineError::is_fatal`] errors abort the run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required setting resolved nowhere (step, endpoint or defaults).
    #[error("No {what} configured for {kind} test step.")]
    NotConfigured {
        what: &'static str,
        kind: &'static str,
    },

    /// An endpoint name was referenced but never declared.
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// A `%{path}` token or body file could not be resolved.
    #[error("Failed to load file: {0}")]
    MissingFile(String),

    /// A request body file that does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Protocol(String),

    #[error("SQLException: {0}")]
    Sql(#[from] rusqlite::Error),
}

impl EngineError {
    /// Whether the error should abort the whole run instead of a
    /// single step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::MissingFile(_))
    }
}
