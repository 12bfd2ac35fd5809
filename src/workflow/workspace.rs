//! Document workspace
//!
//! Wires the store, notifier and the four workflow components around one
//! backend. This is what a UI shell (or the CLI) holds on to.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::commit::RecordsCommitter;
use super::error::{WorkflowError, WorkflowResult};
use super::notify::{Notification, NotificationLevel, Notifier};
use super::poller::{PollConfig, StatusPoller};
use super::store::DocumentStore;
use super::tags::TagEditor;
use super::upload::{UploadConfig, UploadCoordinator};
use crate::backend::{BackendError, DocumentBackend};
use crate::document::{Document, DocumentId};

/// Tunables for a workspace
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub polling: PollConfig,
    pub uploads: UploadConfig,
    pub notification_capacity: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            polling: PollConfig::default(),
            uploads: UploadConfig::default(),
            notification_capacity: 128,
        }
    }
}

pub struct DocumentWorkspace {
    backend: Arc<dyn DocumentBackend>,
    store: Arc<DocumentStore>,
    notifier: Notifier,
    poller: Arc<StatusPoller>,
    uploads: UploadCoordinator,
    tags: TagEditor,
    records: RecordsCommitter,
}

impl DocumentWorkspace {
    pub fn new(backend: Arc<dyn DocumentBackend>, settings: WorkflowSettings) -> Self {
        let store = Arc::new(DocumentStore::new());
        let notifier = Notifier::new(settings.notification_capacity);

        let poller = Arc::new(StatusPoller::new(
            Arc::clone(&backend),
            Arc::clone(&store),
            notifier.clone(),
            settings.polling,
        ));
        let uploads = UploadCoordinator::new(
            Arc::clone(&backend),
            Arc::clone(&store),
            Arc::clone(&poller),
            notifier.clone(),
            settings.uploads,
        );
        let tags = TagEditor::new(Arc::clone(&backend), Arc::clone(&store), notifier.clone());
        let records = RecordsCommitter::new(Arc::clone(&backend), Arc::clone(&store), notifier.clone());

        Self {
            backend,
            store,
            notifier,
            poller,
            uploads,
            tags,
            records,
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn tags(&self) -> &TagEditor {
        &self.tags
    }

    pub fn records(&self) -> &RecordsCommitter {
        &self.records
    }

    /// Seed the collection from the backend's recent documents
    ///
    /// Polling resumes for every document still being analysed. Returns the
    /// number of documents loaded.
    pub async fn load_recent(&self) -> WorkflowResult<usize> {
        let records = match self.backend.recent_documents().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load recent documents");
                self.notifier
                    .error(format!("Could not load documents: {}", e));
                return Err(e.into());
            }
        };

        let documents: Vec<Document> = records.into_iter().map(|r| r.into_document()).collect();
        let pending: Vec<DocumentId> = documents
            .iter()
            .filter(|d| !d.status.is_terminal())
            .map(|d| d.id.clone())
            .collect();
        let count = documents.len();

        self.store.reset(documents).await;
        for id in pending {
            self.poller.spawn(id).await;
        }

        tracing::info!(count, polling = self.poller.active_count().await, "Loaded recent documents");
        Ok(count)
    }

    /// Fetch one document's current state and apply it
    ///
    /// Resumes polling if the document is still being analysed, e.g. after a
    /// loop gave up.
    pub async fn refresh(&self, id: &DocumentId) -> WorkflowResult<Document> {
        if !self.store.contains(id).await {
            return Err(WorkflowError::not_found(id));
        }

        let record = self.backend.get_document(id).await?;
        let document = self.store.apply_state(id, record.state()).await?;

        if !document.status.is_terminal() {
            self.poller.spawn(id.clone()).await;
        }
        Ok(document)
    }

    /// Bring a single document into the collection, fetching it if unknown
    pub async fn track(&self, id: &DocumentId) -> WorkflowResult<Document> {
        if self.store.contains(id).await {
            return self.refresh(id).await;
        }

        let document = self.backend.get_document(id).await?.into_document();
        self.store.upsert(document.clone()).await;

        if !document.status.is_terminal() {
            self.poller.spawn(id.clone()).await;
        }
        Ok(document)
    }

    /// Delete a document from the backend and the collection
    ///
    /// Entries that never reached the backend are removed locally. On backend
    /// failure the document stays where it is.
    pub async fn delete(&self, id: &DocumentId) -> WorkflowResult<()> {
        let document = self
            .store
            .get(id)
            .await
            .ok_or_else(|| WorkflowError::not_found(id))?;

        if !id.is_temporary() {
            match self.backend.delete_document(id).await {
                Ok(()) => {}
                Err(BackendError::NotFound(_)) => {
                    tracing::debug!(document_id = %id, "Already gone on backend");
                }
                Err(e) => {
                    tracing::warn!(document_id = %id, error = %e, "Delete failed");
                    self.notifier.send(
                        Notification::new(
                            NotificationLevel::Error,
                            format!("Failed to delete {}: {}", document.filename, e),
                        )
                        .document(id),
                    );
                    return Err(e.into());
                }
            }
        }

        self.poller.cancel(id).await;
        self.store.remove(id).await;

        self.notifier.send(
            Notification::new(NotificationLevel::Success, format!("Deleted {}", document.filename))
                .document(id),
        );
        Ok(())
    }

    /// Stop all polling
    pub async fn shutdown(&self) {
        self.poller.cancel_all().await;
        tracing::debug!("Workspace shut down");
    }
}
