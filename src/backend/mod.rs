//! Document Backend
//!
//! The external HTTP service that stores uploads, runs extraction and keeps the
//! monthly-records ledger. Workflow components only see the [`DocumentBackend`]
//! trait; [`HttpBackend`] is the production implementation.
//!
//! ## Operations
//!
//! | Operation            | Result             |
//! |----------------------|--------------------|
//! | upload document      | `DocumentRecord`   |
//! | recent documents     | `Vec<DocumentRecord>` |
//! | get document         | `DocumentRecord`   |
//! | update tags          | `DocumentRecord`   |
//! | add to records       | `()`               |
//! | delete document      | `()`               |

mod client;
mod dto;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{HttpBackend, HttpBackendConfig};
pub use dto::{DocumentRecord, MonthValue, TagRecord, TagUpdate};

use async_trait::async_trait;
use thiserror::Error;

use crate::document::{DocumentId, UploadFile};

/// Operations the workflow needs from the backend
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Store a new file and start its analysis
    async fn upload_document(&self, file: UploadFile) -> BackendResult<DocumentRecord>;

    /// Documents used to seed the collection
    async fn recent_documents(&self) -> BackendResult<Vec<DocumentRecord>>;

    /// Current state of one document
    async fn get_document(&self, id: &DocumentId) -> BackendResult<DocumentRecord>;

    /// Replace a document's period and custom tags
    async fn update_tags(&self, id: &DocumentId, update: &TagUpdate)
        -> BackendResult<DocumentRecord>;

    /// Commit a document to the monthly-records ledger
    ///
    /// Not guaranteed idempotent; callers must avoid duplicate calls.
    async fn add_to_records(&self, id: &DocumentId) -> BackendResult<()>;

    /// Remove a document from backend storage
    async fn delete_document(&self, id: &DocumentId) -> BackendResult<()>;
}

/// Errors that can occur when communicating with the backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid backend configuration: {0}")]
    InvalidConfig(String),
}

impl BackendError {
    /// Errors worth retrying for idempotent reads
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Unavailable | BackendError::Timeout => true,
            BackendError::ApiError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
