//! Document Model
//!
//! - **types**: `Document`, `DocumentId`, `DocumentStatus`, `Tag`, `Period`
//! - **file**: Upload payloads
//! - **error**: Model-level errors
//!
//! # State machine
//!
//! ```text
//! uploading ──▶ analyzing ──▶ complete
//!     │             └───────▶ error
//!     └──────────▶ complete | error
//! ```
//!
//! The backend is the only source of truth for transitions; the client never
//! infers completion on its own.

pub mod error;
pub mod file;
pub mod types;

pub use error::{DocumentError, DocumentResult};
pub use file::UploadFile;
pub use types::{Document, DocumentId, DocumentState, DocumentStatus, Period, StatusTag, Tag};
