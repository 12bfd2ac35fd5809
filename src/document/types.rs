//! Core data types for the document workflow
//!
//! This module defines the types shared by every workflow component:
//! - `Document`: one uploaded file and its processing/tagging state
//! - `DocumentId`: temporary (client-generated) or backend-assigned identifier
//! - `DocumentStatus`: the forward-only processing state machine
//! - `Tag` and `Period`: typed document tags

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::{DocumentError, DocumentResult};

/// Prefix marking ids that were generated locally and not yet confirmed by the backend
const TEMP_ID_PREFIX: &str = "temp-";

/// Identifier of a document in the shared collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap a backend-assigned id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a locally-unique temporary id
    pub fn temporary() -> Self {
        Self(format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()))
    }

    /// True if this id was generated locally and never confirmed by the backend
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Processing state of a document
///
/// `Uploading` and `Analyzing` are transient; `Complete` and `Error` are terminal
/// for a given upload attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// File is being sent to the backend
    Uploading,
    /// Backend accepted the file and is extracting it
    #[serde(alias = "processing", alias = "pending")]
    Analyzing,
    /// Extraction finished
    #[serde(alias = "completed")]
    Complete,
    /// Extraction failed
    #[serde(alias = "failed")]
    Error,
}

impl DocumentStatus {
    /// True for statuses that end a polling loop
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Complete | DocumentStatus::Error)
    }

    fn stage(self) -> u8 {
        match self {
            DocumentStatus::Uploading => 0,
            DocumentStatus::Analyzing => 1,
            DocumentStatus::Complete | DocumentStatus::Error => 2,
        }
    }

    /// Whether a document in this status may move to `next`
    ///
    /// Staying put is always allowed. Terminal statuses never change.
    pub fn can_advance_to(self, next: DocumentStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.stage() > self.stage()
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Uploading => write!(f, "uploading"),
            DocumentStatus::Analyzing => write!(f, "analyzing"),
            DocumentStatus::Complete => write!(f, "complete"),
            DocumentStatus::Error => write!(f, "error"),
        }
    }
}

/// A (year, month) reporting period
///
/// Always holds a month in 1-12, including when deserialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "RawPeriod")]
pub struct Period {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct RawPeriod {
    year: i32,
    month: u32,
}

impl TryFrom<RawPeriod> for Period {
    type Error = DocumentError;

    fn try_from(raw: RawPeriod) -> DocumentResult<Self> {
        Period::new(raw.year, raw.month)
    }
}

impl Period {
    /// Create a period, validating the month number
    pub fn new(year: i32, month: u32) -> DocumentResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DocumentError::InvalidMonth(month));
        }
        Ok(Self { year, month })
    }

    /// Create a period from a month label such as "March", "mar" or "3"
    pub fn from_label(label: &str, year: i32) -> DocumentResult<Self> {
        let label = label.trim();

        if let Ok(number) = label.parse::<u32>() {
            return Self::new(year, number);
        }

        let month = chrono::Month::from_str(label)
            .map_err(|_| DocumentError::UnknownMonth(label.to_string()))?;
        Self::new(year, month.number_from_month())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// 1-12
    pub fn month(&self) -> u32 {
        self.month
    }

    /// English month name
    pub fn month_name(&self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| chrono::Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("Unknown")
    }

    /// Display label, e.g. "March 2024"
    pub fn label(&self) -> String {
        format!("{} {}", self.month_name(), self.year)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Values a status tag can carry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatusTag {
    /// Document has been committed to the monthly records ledger
    AddedToRecords,
}

impl StatusTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTag::AddedToRecords => "added_to_records",
        }
    }
}

/// A tag attached to a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Tag {
    /// Associates the document with a reporting period
    Period(Period),
    /// Free-form label
    Custom { value: String },
    /// Workflow marker
    Status { value: StatusTag },
}

impl Tag {
    pub fn period(period: Period) -> Self {
        Tag::Period(period)
    }

    pub fn custom(value: impl Into<String>) -> Self {
        Tag::Custom {
            value: value.into(),
        }
    }

    pub fn added_to_records() -> Self {
        Tag::Status {
            value: StatusTag::AddedToRecords,
        }
    }

    pub fn as_period(&self) -> Option<Period> {
        match self {
            Tag::Period(period) => Some(*period),
            _ => None,
        }
    }

    pub fn is_added_to_records(&self) -> bool {
        matches!(
            self,
            Tag::Status {
                value: StatusTag::AddedToRecords
            }
        )
    }
}

/// Backend-reported state of a document, applied wholesale by pollers and tag saves
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    pub status: DocumentStatus,
    pub tags: Vec<Tag>,
    pub ai_confidence: Option<f64>,
}

/// One uploaded file plus its processing and tagging state
///
/// The file payload itself is never kept here; it belongs to the upload
/// coordinator until the upload call returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    /// Client-observed creation time
    pub upload_date: DateTime<Utc>,
    pub status: DocumentStatus,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub ai_confidence: Option<f64>,
}

impl Document {
    /// Create the optimistic entry shown while a file is uploading
    pub fn provisional(filename: impl Into<String>) -> Self {
        Self {
            id: DocumentId::temporary(),
            filename: filename.into(),
            upload_date: Utc::now(),
            status: DocumentStatus::Uploading,
            tags: Vec::new(),
            ai_confidence: None,
        }
    }

    /// True iff the document carries the `added_to_records` status tag
    pub fn added_to_records(&self) -> bool {
        self.tags.iter().any(Tag::is_added_to_records)
    }

    /// First period tag, which is what gets sent to the backend
    pub fn period(&self) -> Option<Period> {
        self.tags.iter().find_map(Tag::as_period)
    }

    /// All period tags in tag order
    pub fn periods(&self) -> Vec<Period> {
        self.tags.iter().filter_map(Tag::as_period).collect()
    }

    pub fn has_period(&self, period: Period) -> bool {
        self.tags.iter().any(|t| t.as_period() == Some(period))
    }

    /// Values of all custom tags, in order
    pub fn custom_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter_map(|t| match t {
                Tag::Custom { value } => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Append the `added_to_records` marker (no-op if already present)
    pub fn mark_added_to_records(&mut self) {
        if !self.added_to_records() {
            self.tags.push(Tag::added_to_records());
        }
    }

    /// Remove the `added_to_records` marker, returning whether one was present
    pub fn clear_added_to_records(&mut self) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| !t.is_added_to_records());
        self.tags.len() != before
    }

    /// Replace status, tags and confidence with a backend snapshot
    ///
    /// Rejects snapshots that would move the status backwards or out of a
    /// terminal state; the document is left untouched in that case.
    pub fn apply_state(&mut self, state: DocumentState) -> DocumentResult<()> {
        if !self.status.can_advance_to(state.status) {
            return Err(DocumentError::StatusRegression {
                from: self.status,
                to: state.status,
            });
        }

        self.status = state.status;
        self.tags = state.tags;
        self.ai_confidence = state.ai_confidence;
        self.normalize();
        Ok(())
    }

    /// Drop status tags from documents that are not complete
    pub(crate) fn normalize(&mut self) {
        if self.status != DocumentStatus::Complete {
            self.clear_added_to_records();
        }
    }
}
