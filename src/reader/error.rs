//! Reader error types
//!
//! Every failure the data-access core can report, from either backend.

use thiserror::Error;

/// Errors surfaced by filter parsing, client construction and record pulls
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Bad or missing filter, mode conflict, schema mismatch
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The service could not be reached or the snapshot could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote service rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A single record or row could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ReaderError {
    /// Short lowercase name of the error kind, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ReaderError::Configuration(_) => "configuration",
            ReaderError::Connection(_) => "connection",
            ReaderError::Authentication(_) => "authentication",
            ReaderError::Parse(_) => "parse",
        }
    }
}

/// Result type alias for reader operations
pub type ReaderResult<T> = Result<T, ReaderError>;
