//! Document model error types

use thiserror::Error;

use super::types::DocumentStatus;

/// Errors raised by the document model itself
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// Month number outside 1-12
    #[error("Invalid month: {0} (expected 1-12)")]
    InvalidMonth(u32),

    /// Month label that is neither an English month name nor a number
    #[error("Unknown month label: {0}")]
    UnknownMonth(String),

    /// A snapshot tried to move the status backwards or out of a terminal state
    #[error("Status cannot move from {from} to {to}")]
    StatusRegression {
        from: DocumentStatus,
        to: DocumentStatus,
    },
}

/// Result type alias for document model operations
pub type DocumentResult<T> = Result<T, DocumentError>;
