//! Document ingestion workflow
//!
//! ```text
//! UploadCoordinator ──id──▶ StatusPoller ──status/tags──▶ DocumentStore
//!                                                            │
//!                        RecordsCommitter ◀── TagEditor ◀────┘
//!                               │
//!                               └──▶ listener (affected periods)
//! ```
//!
//! All components share one [`DocumentStore`] and one [`Notifier`];
//! [`DocumentWorkspace`] wires them together around a backend.

pub mod commit;
pub mod error;
pub mod notify;
pub mod poller;
pub mod store;
pub mod tags;
pub mod upload;
pub mod workspace;

pub use commit::{CommitListener, CommitSummary, CommittedDocument, RecordsCommitter};
pub use error::{WorkflowError, WorkflowResult};
pub use notify::{drain, Notification, NotificationLevel, Notifier};
pub use poller::{GiveUpReason, PollConfig, PollOutcome, StatusPoller};
pub use store::{DocumentStore, StoreError, StoreEvent, StoreResult};
pub use tags::{TagDraft, TagEditor};
pub use upload::{UploadConfig, UploadCoordinator, UploadOutcome};
pub use workspace::{DocumentWorkspace, WorkflowSettings};
