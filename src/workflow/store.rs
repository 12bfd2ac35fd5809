//! Document Store
//!
//! The single shared, id-keyed collection of documents. Every workflow
//! component mutates it through whole-entry operations keyed by id; there is
//! no partial merge. Changes are published on a broadcast channel so views can
//! refresh.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

use crate::document::{Document, DocumentError, DocumentId, DocumentState};

/// Change notifications published by the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Confirmed entries replaced by a reload
    Reset { count: usize },
    Inserted(DocumentId),
    Updated(DocumentId),
    /// Temporary id swapped for the backend id
    Renamed { from: DocumentId, to: DocumentId },
    Removed(DocumentId),
}

/// Errors raised by store mutations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Document not in collection: {0}")]
    NotFound(DocumentId),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared document collection, newest first
pub struct DocumentStore {
    documents: RwLock<Vec<Document>>,
    /// Ids retagged after a commit; the backend copy still carries the old marker
    recommit: Mutex<HashSet<DocumentId>>,
    events: broadcast::Sender<StoreEvent>,
}

impl DocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_event_capacity(256)
    }

    /// Create an empty store with a custom event channel capacity
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            documents: RwLock::new(Vec::new()),
            recommit: Mutex::new(HashSet::new()),
            events,
        }
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn recommit_ids(&self) -> MutexGuard<'_, HashSet<DocumentId>> {
        self.recommit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Treat `id` as not committed until [`mark_committed`](Self::mark_committed),
    /// whatever later backend snapshots say
    pub fn require_recommit(&self, id: &DocumentId) {
        self.recommit_ids().insert(id.clone());
    }

    pub fn needs_recommit(&self, id: &DocumentId) -> bool {
        self.recommit_ids().contains(id)
    }

    fn strip_stale_marker(&self, document: &mut Document) {
        if self.needs_recommit(&document.id) {
            document.clear_added_to_records();
        }
    }

    /// Replace every confirmed entry with a reload from the backend
    ///
    /// Provisional entries whose upload is still in flight stay at the front,
    /// so the id swap can still find them.
    pub async fn reset(&self, documents: Vec<Document>) {
        let count = {
            let mut current = self.documents.write().await;
            let mut merged: Vec<Document> = current
                .drain(..)
                .filter(|d| d.id.is_temporary())
                .collect();
            merged.extend(documents.into_iter().map(|mut d| {
                self.strip_stale_marker(&mut d);
                d
            }));
            *current = merged;
            current.len()
        };
        self.publish(StoreEvent::Reset { count });
    }

    /// Insert a document at the front, or replace the entry with the same id in place
    pub async fn upsert(&self, mut document: Document) {
        self.strip_stale_marker(&mut document);
        let id = document.id.clone();
        let inserted = {
            let mut documents = self.documents.write().await;
            match documents.iter_mut().find(|d| d.id == id) {
                Some(existing) => {
                    *existing = document;
                    false
                }
                None => {
                    documents.insert(0, document);
                    true
                }
            }
        };

        self.publish(if inserted {
            StoreEvent::Inserted(id)
        } else {
            StoreEvent::Updated(id)
        });
    }

    /// Replace an existing entry; never re-inserts a removed document
    pub async fn replace(&self, document: Document) -> StoreResult<()> {
        let id = document.id.clone();
        {
            let mut documents = self.documents.write().await;
            let existing = documents
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            *existing = document;
        }

        self.publish(StoreEvent::Updated(id));
        Ok(())
    }

    /// Swap a temporary id for the backend id and adopt the backend state
    ///
    /// The entry keeps its position. Any other entry already holding `new_id`
    /// (e.g. from a concurrent reload) is dropped.
    pub async fn replace_id(
        &self,
        temp_id: &DocumentId,
        new_id: DocumentId,
        state: DocumentState,
    ) -> StoreResult<Document> {
        let updated = {
            let mut documents = self.documents.write().await;
            let index = documents
                .iter()
                .position(|d| &d.id == temp_id)
                .ok_or_else(|| StoreError::NotFound(temp_id.clone()))?;

            let mut document = documents[index].clone();
            document.apply_state(state)?;
            document.id = new_id.clone();
            documents[index] = document.clone();

            let mut position = 0;
            documents.retain(|d| {
                let keep = d.id != new_id || position == index;
                position += 1;
                keep
            });
            document
        };

        self.publish(StoreEvent::Renamed {
            from: temp_id.clone(),
            to: new_id,
        });
        Ok(updated)
    }

    /// Apply a backend snapshot (status, tags, confidence) to one entry
    pub async fn apply_state(&self, id: &DocumentId, mut state: DocumentState) -> StoreResult<Document> {
        if self.needs_recommit(id) {
            state.tags.retain(|t| !t.is_added_to_records());
        }
        let updated = {
            let mut documents = self.documents.write().await;
            let document = documents
                .iter_mut()
                .find(|d| &d.id == id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            document.apply_state(state)?;
            document.clone()
        };

        self.publish(StoreEvent::Updated(id.clone()));
        Ok(updated)
    }

    /// Mutate one entry in place
    pub async fn update<F>(&self, id: &DocumentId, f: F) -> StoreResult<Document>
    where
        F: FnOnce(&mut Document),
    {
        let updated = {
            let mut documents = self.documents.write().await;
            let document = documents
                .iter_mut()
                .find(|d| &d.id == id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            f(document);
            document.normalize();
            document.clone()
        };

        self.publish(StoreEvent::Updated(id.clone()));
        Ok(updated)
    }

    /// Record a successful commit on one entry
    pub async fn mark_committed(&self, id: &DocumentId) -> StoreResult<Document> {
        self.recommit_ids().remove(id);
        self.update(id, Document::mark_added_to_records).await
    }

    /// Remove an entry, returning it if it existed
    pub async fn remove(&self, id: &DocumentId) -> Option<Document> {
        let removed = {
            let mut documents = self.documents.write().await;
            let index = documents.iter().position(|d| &d.id == id)?;
            documents.remove(index)
        };
        self.recommit_ids().remove(id);

        self.publish(StoreEvent::Removed(id.clone()));
        Some(removed)
    }

    pub async fn get(&self, id: &DocumentId) -> Option<Document> {
        self.documents
            .read()
            .await
            .iter()
            .find(|d| &d.id == id)
            .cloned()
    }

    pub async fn contains(&self, id: &DocumentId) -> bool {
        self.documents.read().await.iter().any(|d| &d.id == id)
    }

    /// Snapshot of the whole collection
    pub async fn all(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    /// Snapshot of the entries matching a predicate, in collection order
    pub async fn filter<P>(&self, predicate: P) -> Vec<Document>
    where
        P: Fn(&Document) -> bool,
    {
        self.documents
            .read()
            .await
            .iter()
            .filter(|d| predicate(*d))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
