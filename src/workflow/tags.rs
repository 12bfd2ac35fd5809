//! Tag Editor
//!
//! Period and custom tags are edited on a [`TagDraft`], a private copy of one
//! completed document. Nothing is shared until [`TagEditor::save`] succeeds;
//! dropping the draft discards the edits.

use std::sync::Arc;

use super::error::{WorkflowError, WorkflowResult};
use super::notify::{Notification, NotificationLevel, Notifier};
use super::store::DocumentStore;
use crate::backend::{DocumentBackend, TagUpdate};
use crate::document::{Document, DocumentId, DocumentResult, DocumentStatus, Period, Tag};

/// Editable snapshot of one document's tags
#[derive(Debug, Clone, PartialEq)]
pub struct TagDraft {
    document: Document,
}

impl TagDraft {
    fn new(document: Document) -> Self {
        Self { document }
    }

    pub fn id(&self) -> &DocumentId {
        &self.document.id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn tags(&self) -> &[Tag] {
        &self.document.tags
    }

    /// Select or deselect the period for `month_label` in `year`
    ///
    /// Returns whether the period is selected afterwards.
    pub fn toggle_period_tag(&mut self, month_label: &str, year: i32) -> DocumentResult<bool> {
        let period = Period::from_label(month_label, year)?;

        if self.document.has_period(period) {
            self.document.tags.retain(|t| t.as_period() != Some(period));
            Ok(false)
        } else {
            self.document.tags.push(Tag::period(period));
            Ok(true)
        }
    }

    /// Whether the period for `month_label` in `year` is selected; unknown labels never are
    pub fn is_tag_selected(&self, month_label: &str, year: i32) -> bool {
        Period::from_label(month_label, year)
            .map(|period| self.document.has_period(period))
            .unwrap_or(false)
    }

    pub fn clear_periods(&mut self) {
        self.document.tags.retain(|t| t.as_period().is_none());
    }

    /// Add a custom tag; blank and duplicate values are ignored
    pub fn add_custom_tag(&mut self, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() || self.document.custom_tags().iter().any(|v| v == value) {
            return false;
        }
        self.document.tags.push(Tag::custom(value));
        true
    }

    pub fn remove_custom_tag(&mut self, value: &str) -> bool {
        let before = self.document.tags.len();
        self.document
            .tags
            .retain(|t| !matches!(t, Tag::Custom { value: v } if v == value));
        self.document.tags.len() != before
    }

    /// First selected period
    pub fn period(&self) -> Option<Period> {
        self.document.period()
    }

    pub fn periods(&self) -> Vec<Period> {
        self.document.periods()
    }

    pub fn custom_tags(&self) -> Vec<String> {
        self.document.custom_tags()
    }
}

pub struct TagEditor {
    backend: Arc<dyn DocumentBackend>,
    store: Arc<DocumentStore>,
    notifier: Notifier,
}

impl TagEditor {
    pub fn new(backend: Arc<dyn DocumentBackend>, store: Arc<DocumentStore>, notifier: Notifier) -> Self {
        Self {
            backend,
            store,
            notifier,
        }
    }

    /// Start editing a completed document
    pub async fn open(&self, id: &DocumentId) -> WorkflowResult<TagDraft> {
        let document = self
            .store
            .get(id)
            .await
            .ok_or_else(|| WorkflowError::not_found(id))?;

        if document.status != DocumentStatus::Complete {
            return Err(WorkflowError::NotReady {
                id: id.clone(),
                status: document.status,
            });
        }

        Ok(TagDraft::new(document))
    }

    /// Persist a draft and replace the shared entry
    ///
    /// A saved document is no longer considered committed: any
    /// `added_to_records` marker is dropped from the result, and later
    /// backend snapshots cannot restore it until the document is committed
    /// again.
    pub async fn save(&self, draft: TagDraft) -> WorkflowResult<Document> {
        let id = draft.id().clone();
        let filename = draft.document.filename.clone();

        match self.persist(draft).await {
            Ok(document) => {
                self.notifier.send(
                    Notification::new(
                        NotificationLevel::Success,
                        format!("Tags saved for {}", filename),
                    )
                    .document(&id),
                );
                Ok(document)
            }
            Err(e) => {
                tracing::warn!(document_id = %id, error = %e, "Tag save failed");
                self.notifier.send(
                    Notification::new(
                        NotificationLevel::Error,
                        format!("Failed to save tags for {}: {}", filename, e),
                    )
                    .document(&id),
                );
                Err(e)
            }
        }
    }

    async fn persist(&self, draft: TagDraft) -> WorkflowResult<Document> {
        let periods = draft.periods().len();
        if periods > 1 {
            return Err(WorkflowError::AmbiguousPeriod {
                id: draft.id().clone(),
                count: periods,
            });
        }

        let update = TagUpdate::from_document(&draft.document);
        tracing::debug!(
            document_id = %draft.id(),
            year = ?update.year,
            month = ?update.month,
            custom = update.custom_tags.len(),
            "Saving tags"
        );

        let record = self.backend.update_tags(draft.id(), &update).await?;

        let mut state = record.state();
        let was_committed = draft.document.added_to_records();
        let backend_marked = state.tags.iter().any(Tag::is_added_to_records);
        state.tags.retain(|t| !t.is_added_to_records());

        let mut document = draft.document;
        document.apply_state(state)?;
        self.store.replace(document.clone()).await?;

        if was_committed || backend_marked {
            self.store.require_recommit(&document.id);
        }

        Ok(document)
    }

    /// Abandon a draft
    pub fn cancel(&self, draft: TagDraft) {
        tracing::debug!(document_id = %draft.id(), "Tag edit cancelled");
    }
}
