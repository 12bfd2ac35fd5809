//! # Ledgerdesk
//!
//! Document ingestion and period-tagging workflow for an SME financial-advisory
//! backend: bulk upload, asynchronous analysis polling, month/year tagging and
//! commit to the monthly records.
//!
//! ## Modules
//!
//! - [`document`]: Document model, tags, periods and the status state machine
//! - [`backend`]: Backend seam and its HTTP client
//! - [`workflow`]: Shared store, notifications and the four workflow components
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ledgerdesk::{DocumentWorkspace, HttpBackend, HttpBackendConfig, UploadFile, WorkflowSettings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(HttpBackend::new(HttpBackendConfig::default())?);
//!     let workspace = DocumentWorkspace::new(backend, WorkflowSettings::default());
//!
//!     workspace.records().set_listener(|committed| {
//!         println!("{} document(s) added to records", committed.len());
//!     });
//!
//!     // Upload and wait for analysis
//!     let file = UploadFile::from_path("invoice-march.pdf".as_ref()).await?;
//!     let outcomes = workspace.uploads().upload_batch(vec![file]).await;
//!     workspace.poller().wait_all().await;
//!
//!     // Tag with a period and commit
//!     if let Some(id) = outcomes[0].id() {
//!         let mut draft = workspace.tags().open(id).await?;
//!         draft.toggle_period_tag("March", 2024)?;
//!         workspace.tags().save(draft).await?;
//!         workspace.records().commit_one(id).await?;
//!     }
//!
//!     workspace.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod document;
pub mod workflow;

// Re-export top-level types for convenience
pub use document::{
    Document, DocumentError, DocumentId, DocumentResult, DocumentState, DocumentStatus, Period,
    StatusTag, Tag, UploadFile,
};

pub use backend::{
    BackendError, BackendResult, DocumentBackend, DocumentRecord, HttpBackend, HttpBackendConfig,
    TagRecord, TagUpdate,
};

pub use workflow::{
    CommitSummary, CommittedDocument, DocumentStore, DocumentWorkspace, Notification,
    NotificationLevel, Notifier, PollConfig, PollOutcome, RecordsCommitter, StatusPoller,
    TagDraft, TagEditor, UploadConfig, UploadCoordinator, UploadOutcome, WorkflowError,
    WorkflowResult, WorkflowSettings,
};

pub use config::{Config, ConfigError, LoggingConfig};
