//! Records Committer
//!
//! Moves completed documents into the permanent monthly records and tells the
//! registered listener which periods changed, so dependent views can refresh.

use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::error::{WorkflowError, WorkflowResult};
use super::notify::{Notification, NotificationLevel, Notifier};
use super::store::{DocumentStore, StoreError};
use crate::backend::DocumentBackend;
use crate::document::{Document, DocumentId, DocumentStatus, Period};

/// A document that made it into the records, with the period it was filed under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedDocument {
    pub id: DocumentId,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl CommittedDocument {
    fn from_document(document: &Document) -> Self {
        let period = document.period();
        Self {
            id: document.id.clone(),
            year: period.map(|p| p.year()),
            month: period.map(|p| p.month()),
        }
    }

    pub fn period(&self) -> Option<Period> {
        match (self.year, self.month) {
            (Some(year), Some(month)) => Period::new(year, month).ok(),
            _ => None,
        }
    }
}

/// Called with every batch of successful commits
pub type CommitListener = Arc<dyn Fn(&[CommittedDocument]) + Send + Sync>;

/// Result of a `commit_all` run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitSummary {
    pub committed: Vec<CommittedDocument>,
    /// Failed ids with the error message
    pub failed: Vec<(DocumentId, String)>,
}

impl CommitSummary {
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.failed.is_empty()
    }

    /// Distinct periods touched by the committed documents
    pub fn periods(&self) -> BTreeSet<Period> {
        self.committed
            .iter()
            .filter_map(CommittedDocument::period)
            .collect()
    }
}

/// Marks an id as being committed until dropped
struct InFlight<'a> {
    ids: &'a Mutex<HashSet<DocumentId>>,
    id: DocumentId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

pub struct RecordsCommitter {
    backend: Arc<dyn DocumentBackend>,
    store: Arc<DocumentStore>,
    notifier: Notifier,
    listener: RwLock<Option<CommitListener>>,
    in_flight: Mutex<HashSet<DocumentId>>,
}

impl RecordsCommitter {
    pub fn new(backend: Arc<dyn DocumentBackend>, store: Arc<DocumentStore>, notifier: Notifier) -> Self {
        Self {
            backend,
            store,
            notifier,
            listener: RwLock::new(None),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Register the upward listener, replacing any previous one
    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(&[CommittedDocument]) + Send + Sync + 'static,
    {
        *self
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    fn report(&self, committed: &[CommittedDocument]) {
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if let Some(listener) = listener {
            listener(committed);
        }
    }

    fn claim(&self, id: &DocumentId) -> WorkflowResult<InFlight<'_>> {
        let mut ids = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(id.clone()) {
            return Err(WorkflowError::CommitInProgress(id.clone()));
        }
        Ok(InFlight {
            ids: &self.in_flight,
            id: id.clone(),
        })
    }

    /// Commit a single completed document
    pub async fn commit_one(&self, id: &DocumentId) -> WorkflowResult<CommittedDocument> {
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
        if document.added_to_records() {
            return Err(WorkflowError::AlreadyCommitted(id.clone()));
        }

        match self.commit_document(&document).await {
            Ok(committed) => {
                self.notifier.send(
                    Notification::new(
                        NotificationLevel::Success,
                        format!("Added {} to records", document.filename),
                    )
                    .document(id),
                );
                self.report(std::slice::from_ref(&committed));
                Ok(committed)
            }
            Err(e) => {
                self.notify_failure(&document, &e);
                Err(e)
            }
        }
    }

    /// Commit every completed document not yet in the records
    ///
    /// Runs sequentially and keeps going past failures. The listener hears
    /// about all successes once, after the last document.
    pub async fn commit_all(&self) -> CommitSummary {
        let eligible = self
            .store
            .filter(|d| d.status == DocumentStatus::Complete && !d.added_to_records())
            .await;

        if eligible.is_empty() {
            self.notifier.info("No documents ready to add to records");
            return CommitSummary::default();
        }

        tracing::info!(count = eligible.len(), "Committing documents to records");

        let mut summary = CommitSummary::default();
        for document in &eligible {
            match self.commit_document(document).await {
                Ok(committed) => summary.committed.push(committed),
                Err(e) => {
                    self.notify_failure(document, &e);
                    summary.failed.push((document.id.clone(), e.to_string()));
                }
            }
        }

        if !summary.committed.is_empty() {
            self.report(&summary.committed);
        }

        let committed = summary.committed.len();
        if summary.failed.is_empty() {
            self.notifier
                .success(format!("Added {} document(s) to records", committed));
        } else {
            self.notifier.info(format!(
                "Added {} of {} document(s) to records",
                committed,
                eligible.len()
            ));
        }

        summary
    }

    async fn commit_document(&self, document: &Document) -> WorkflowResult<CommittedDocument> {
        let id = &document.id;
        let _guard = self.claim(id)?;

        self.backend.add_to_records(id).await?;

        // Report the entry as it is now; tags may have been saved meanwhile
        let committed = match self.store.mark_committed(id).await {
            Ok(current) => CommittedDocument::from_document(&current),
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(document_id = %id, "Committed document no longer in collection");
                CommittedDocument::from_document(document)
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(document_id = %id, period = ?committed.period(), "Added to records");
        Ok(committed)
    }

    fn notify_failure(&self, document: &Document, error: &WorkflowError) {
        tracing::warn!(document_id = %document.id, error = %error, "Commit failed");
        self.notifier.send(
            Notification::new(
                NotificationLevel::Error,
                format!("Failed to add {} to records: {}", document.filename, error),
            )
            .document(&document.id),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::document::Tag;
    use crate::workflow::notify::drain;
    use std::time::Duration;

    type Reports = Arc<Mutex<Vec<Vec<CommittedDocument>>>>;

    struct Fixture {
        backend: Arc<MockBackend>,
        store: Arc<DocumentStore>,
        notifier: Notifier,
        committer: RecordsCommitter,
        reports: Reports,
    }

    fn fixture() -> Fixture {
        fixture_with(MockBackend::new())
    }

    fn fixture_with(backend: MockBackend) -> Fixture {
        let backend = Arc::new(backend);
        let store = Arc::new(DocumentStore::new());
        let notifier = Notifier::default();
        let committer = RecordsCommitter::new(backend.clone(), Arc::clone(&store), notifier.clone());

        let reports: Reports = Arc::default();
        let sink = Arc::clone(&reports);
        committer.set_listener(move |docs| sink.lock().unwrap().push(docs.to_vec()));

        Fixture {
            backend,
            store,
            notifier,
            committer,
            reports,
        }
    }

    async fn seed(f: &Fixture, id: &str, status: DocumentStatus, tags: Vec<Tag>) -> DocumentId {
        f.backend.insert_complete(id, tags.clone());
        let mut doc = Document::provisional(format!("{}.pdf", id));
        doc.id = DocumentId::new(id);
        doc.status = status;
        doc.tags = tags;
        f.store.upsert(doc).await;
        DocumentId::new(id)
    }

    fn period(year: i32, month: u32) -> Tag {
        Tag::period(Period::new(year, month).unwrap())
    }

    #[tokio::test]
    async fn test_commit_one_reports_period() {
        let f = fixture();
        let id = seed(&f, "1", DocumentStatus::Complete, vec![period(2024, 3)]).await;

        let committed = f.committer.commit_one(&id).await.unwrap();

        assert_eq!(
            committed,
            CommittedDocument {
                id: id.clone(),
                year: Some(2024),
                month: Some(3)
            }
        );
        assert!(f.store.get(&id).await.unwrap().added_to_records());
        assert_eq!(f.backend.commit_calls(), vec!["1"]);
        assert_eq!(*f.reports.lock().unwrap(), vec![vec![committed]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_reports_period_saved_while_in_flight() {
        let f = fixture_with(MockBackend::new().commit_delay(Duration::from_millis(500)));
        let id = seed(&f, "1", DocumentStatus::Complete, vec![period(2024, 3)]).await;

        let store = Arc::clone(&f.store);
        let retag_id = id.clone();
        let retag = async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let mut doc = store.get(&retag_id).await.unwrap();
            doc.tags = vec![period(2024, 4)];
            store.replace(doc).await.unwrap();
        };

        let (committed, ()) = tokio::join!(f.committer.commit_one(&id), retag);
        let committed = committed.unwrap();

        assert_eq!(committed.period(), Some(Period::new(2024, 4).unwrap()));
        assert_eq!(*f.reports.lock().unwrap(), vec![vec![committed.clone()]]);

        let doc = f.store.get(&id).await.unwrap();
        assert!(doc.added_to_records());
        assert_eq!(doc.period(), Some(Period::new(2024, 4).unwrap()));
    }

    #[tokio::test]
    async fn test_commit_one_preconditions() {
        let f = fixture();
        let analyzing = seed(&f, "1", DocumentStatus::Analyzing, Vec::new()).await;
        let done = seed(&f, "2", DocumentStatus::Complete, vec![Tag::added_to_records()]).await;

        assert!(matches!(
            f.committer.commit_one(&analyzing).await,
            Err(WorkflowError::NotReady { .. })
        ));
        assert!(matches!(
            f.committer.commit_one(&done).await,
            Err(WorkflowError::AlreadyCommitted(_))
        ));
        assert!(f.backend.commit_calls().is_empty());
        assert!(f.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_one_failure() {
        let f = fixture();
        let id = seed(&f, "1", DocumentStatus::Complete, Vec::new()).await;
        f.backend.fail_commit("1");
        let mut rx = f.notifier.subscribe();

        assert!(f.committer.commit_one(&id).await.is_err());

        assert!(!f.store.get(&id).await.unwrap().added_to_records());
        assert!(f.reports.lock().unwrap().is_empty());
        let notes = drain(&mut rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn test_commit_all_twice() {
        let f = fixture();
        seed(&f, "1", DocumentStatus::Complete, vec![period(2024, 3)]).await;
        seed(&f, "2", DocumentStatus::Complete, vec![period(2024, 4)]).await;
        seed(&f, "3", DocumentStatus::Analyzing, Vec::new()).await;

        let first = f.committer.commit_all().await;
        assert_eq!(first.committed.len(), 2);
        assert!(first.failed.is_empty());
        assert_eq!(
            first.periods().into_iter().collect::<Vec<_>>(),
            vec![Period::new(2024, 3).unwrap(), Period::new(2024, 4).unwrap()]
        );
        assert_eq!(f.reports.lock().unwrap().len(), 1);

        let mut rx = f.notifier.subscribe();
        let second = f.committer.commit_all().await;

        assert!(second.is_empty());
        assert_eq!(f.backend.commit_calls().len(), 2);
        assert_eq!(f.reports.lock().unwrap().len(), 1);
        let notes = drain(&mut rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Info);
    }

    #[tokio::test]
    async fn test_commit_all_continues_past_failure() {
        let f = fixture();
        seed(&f, "1", DocumentStatus::Complete, Vec::new()).await;
        seed(&f, "2", DocumentStatus::Complete, Vec::new()).await;
        seed(&f, "3", DocumentStatus::Complete, Vec::new()).await;
        f.backend.fail_commit("2");
        let mut rx = f.notifier.subscribe();

        let summary = f.committer.commit_all().await;

        assert_eq!(summary.committed.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, DocumentId::new("2"));
        assert_eq!(f.backend.commit_calls().len(), 3);

        let reports = f.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].len(), 2);

        let errors = drain(&mut rx)
            .into_iter()
            .filter(|n| n.level == NotificationLevel::Error)
            .count();
        assert_eq!(errors, 1);
        assert!(!f.store.get(&DocumentId::new("2")).await.unwrap().added_to_records());
    }

    #[tokio::test]
    async fn test_commit_all_empty() {
        let f = fixture();
        let mut rx = f.notifier.subscribe();

        let summary = f.committer.commit_all().await;

        assert!(summary.is_empty());
        assert!(f.backend.commit_calls().is_empty());
        assert!(f.reports.lock().unwrap().is_empty());
        assert_eq!(drain(&mut rx)[0].level, NotificationLevel::Info);
    }

    #[test]
    fn test_in_flight_guard() {
        let f = fixture();
        let id = DocumentId::new("1");

        let guard = f.committer.claim(&id).unwrap();
        assert!(matches!(
            f.committer.claim(&id),
            Err(WorkflowError::CommitInProgress(_))
        ));

        drop(guard);
        assert!(f.committer.claim(&id).is_ok());
    }
}
