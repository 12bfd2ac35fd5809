//! Workflow error types

use thiserror::Error;

use super::store::StoreError;
use crate::backend::BackendError;
use crate::document::{DocumentError, DocumentId, DocumentStatus};

/// Errors surfaced by workflow components
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Backend call failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Shared collection rejected the change
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid model value (period, status transition)
    #[error("{0}")]
    Document(#[from] DocumentError),

    /// Operation needs a document in a different status
    #[error("Document {id} is {status}, expected complete")]
    NotReady { id: DocumentId, status: DocumentStatus },

    #[error("Document {0} is already in the records")]
    AlreadyCommitted(DocumentId),

    #[error("Document {0} is already being committed")]
    CommitInProgress(DocumentId),

    /// File refused before upload (type or size)
    #[error("{filename} rejected: {reason}")]
    Rejected { filename: String, reason: String },

    /// A document can belong to one reporting period only
    #[error("Document {id} has {count} period tags; select exactly one")]
    AmbiguousPeriod { id: DocumentId, count: usize },
}

impl WorkflowError {
    pub(crate) fn not_found(id: &DocumentId) -> Self {
        WorkflowError::Store(StoreError::NotFound(id.clone()))
    }
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
