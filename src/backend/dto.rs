//! Request/Response DTOs for the document backend
//!
//! The backend speaks loosely-typed JSON: ids can be strings or integers, tags
//! are `{tag, value, year?, month?}` records. Everything is converted into the
//! typed model from [`crate::document`] at this boundary.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::document::{Document, DocumentId, DocumentState, DocumentStatus, Period, StatusTag, Tag};

/// A document as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: DocumentId,
    #[serde(default, alias = "file_name", alias = "name")]
    pub filename: Option<String>,
    #[serde(default, alias = "uploadDate", alias = "created_at")]
    pub upload_date: Option<String>,
    pub status: DocumentStatus,
    #[serde(default)]
    pub tags: Vec<TagRecord>,
    #[serde(default)]
    pub ai_confidence: Option<f64>,
}

/// A single tag on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagRecord {
    pub tag: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<MonthValue>,
}

/// Month field as sent by the backend: a number or an English name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MonthValue {
    Number(u32),
    Name(String),
}

/// Body of the tag-update operation
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TagUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    pub custom_tags: Vec<String>,
}

/// `GET /documents/recent` answers either a bare list or a wrapped one
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RecentDocumentsResponse {
    List(Vec<DocumentRecord>),
    Wrapped { documents: Vec<DocumentRecord> },
}

impl RecentDocumentsResponse {
    pub(crate) fn into_records(self) -> Vec<DocumentRecord> {
        match self {
            RecentDocumentsResponse::List(records) => records,
            RecentDocumentsResponse::Wrapped { documents } => documents,
        }
    }
}

impl DocumentRecord {
    pub fn new(id: impl Into<DocumentId>, filename: impl Into<String>, status: DocumentStatus) -> Self {
        Self {
            id: id.into(),
            filename: Some(filename.into()),
            upload_date: None,
            status,
            tags: Vec::new(),
            ai_confidence: None,
        }
    }

    /// Typed tags; unknown or malformed entries are dropped with a warning
    pub fn tags(&self) -> Vec<Tag> {
        self.tags
            .iter()
            .filter_map(|record| {
                let tag = record.to_tag();
                if tag.is_none() {
                    tracing::warn!(
                        document_id = %self.id,
                        tag = %record.tag,
                        value = %record.value,
                        "Ignoring unrecognised tag"
                    );
                }
                tag
            })
            .collect()
    }

    /// The parts of the record that pollers and tag saves apply to a document
    pub fn state(&self) -> DocumentState {
        DocumentState {
            status: self.status,
            tags: self.tags(),
            ai_confidence: self.ai_confidence,
        }
    }

    /// Build a full document, e.g. when seeding the collection
    pub fn into_document(self) -> Document {
        let upload_date = self
            .upload_date
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        let mut document = Document {
            tags: self.tags(),
            id: self.id,
            filename: self.filename.unwrap_or_else(|| "untitled".to_string()),
            upload_date,
            status: self.status,
            ai_confidence: self.ai_confidence,
        };
        document.normalize();
        document
    }
}

impl TagRecord {
    pub fn to_tag(&self) -> Option<Tag> {
        match self.tag.as_str() {
            "period" => self.to_period().map(Tag::Period),
            "custom" if !self.value.trim().is_empty() => Some(Tag::custom(self.value.trim())),
            "status" if self.value == StatusTag::AddedToRecords.as_str() => {
                Some(Tag::added_to_records())
            }
            _ => None,
        }
    }

    /// Year/month from the dedicated fields, falling back to a "March 2024" value
    fn to_period(&self) -> Option<Period> {
        let mut words = self.value.split_whitespace();
        let value_month = words.next();
        let value_year = words.next().and_then(|y| y.parse::<i32>().ok());

        let year = self.year.or(value_year)?;
        match &self.month {
            Some(MonthValue::Number(n)) => Period::new(year, *n).ok(),
            Some(MonthValue::Name(name)) => Period::from_label(name, year).ok(),
            None => Period::from_label(value_month?, year).ok(),
        }
    }

    pub fn from_tag(tag: &Tag) -> Self {
        match tag {
            Tag::Period(period) => Self {
                tag: "period".to_string(),
                value: period.label(),
                year: Some(period.year()),
                month: Some(MonthValue::Number(period.month())),
            },
            Tag::Custom { value } => Self {
                tag: "custom".to_string(),
                value: value.clone(),
                year: None,
                month: None,
            },
            Tag::Status { value } => Self {
                tag: "status".to_string(),
                value: value.as_str().to_string(),
                year: None,
                month: None,
            },
        }
    }
}

impl TagUpdate {
    /// Derive the update body from a document's tags: first period plus all custom values
    pub fn from_document(document: &Document) -> Self {
        let period = document.period();
        Self {
            year: period.map(|p| p.year()),
            month: period.map(|p| p.month()),
            custom_tags: document.custom_tags(),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<DocumentId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => DocumentId::new(s),
        RawId::Number(n) => DocumentId::new(n.to_string()),
    })
}
