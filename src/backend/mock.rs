//! Scripted in-memory backend for workflow tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::{BackendError, BackendResult, DocumentBackend, DocumentRecord, TagRecord, TagUpdate};
use crate::document::{DocumentId, DocumentStatus, Period, Tag, UploadFile};

/// One scripted answer to `get_document`
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Status(DocumentStatus),
    Fail,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    upload_status: Option<DocumentStatus>,
    upload_delay: Option<Duration>,
    commit_delay: Option<Duration>,
    documents: HashMap<String, DocumentRecord>,
    scripts: HashMap<String, VecDeque<Scripted>>,
    failing_uploads: HashSet<String>,
    failing_commits: HashSet<String>,
    fail_tag_updates: bool,
    fail_deletes: bool,
    uploads: Vec<String>,
    gets: HashMap<String, usize>,
    tag_updates: Vec<(String, TagUpdate)>,
    commits: Vec<String>,
    deletes: Vec<String>,
}

pub(crate) struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Status reported by uploads (defaults to `analyzing`)
    pub(crate) fn upload_status(self, status: DocumentStatus) -> Self {
        self.state.lock().unwrap().upload_status = Some(status);
        self
    }

    /// Hold every upload for `delay` before answering
    pub(crate) fn upload_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().upload_delay = Some(delay);
        self
    }

    pub(crate) fn commit_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().commit_delay = Some(delay);
        self
    }

    /// Answers for successive polls of `id`; the last entry repeats
    pub(crate) fn script(&self, id: &str, answers: Vec<Scripted>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(id.to_string(), answers.into());
    }

    pub(crate) fn insert(&self, record: DocumentRecord) {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(record.id.to_string(), record);
    }

    /// Complete document with the given tags, stored server-side
    pub(crate) fn insert_complete(&self, id: &str, tags: Vec<Tag>) {
        let mut record = DocumentRecord::new(id, format!("{}.pdf", id), DocumentStatus::Complete);
        record.tags = tags.iter().map(TagRecord::from_tag).collect();
        record.ai_confidence = Some(0.9);
        self.insert(record);
    }

    pub(crate) fn fail_upload(&self, filename: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_uploads
            .insert(filename.to_string());
    }

    pub(crate) fn fail_commit(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_commits
            .insert(id.to_string());
    }

    pub(crate) fn fail_tag_updates(&self, fail: bool) {
        self.state.lock().unwrap().fail_tag_updates = fail;
    }

    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.state.lock().unwrap().fail_deletes = fail;
    }

    pub(crate) fn upload_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub(crate) fn get_count(&self, id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .gets
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn tag_update_calls(&self) -> Vec<(String, TagUpdate)> {
        self.state.lock().unwrap().tag_updates.clone()
    }

    pub(crate) fn commit_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().commits.clone()
    }

    pub(crate) fn delete_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }
}

fn not_found(id: &DocumentId) -> BackendError {
    BackendError::NotFound(id.to_string())
}

#[async_trait]
impl DocumentBackend for MockBackend {
    async fn upload_document(&self, file: UploadFile) -> BackendResult<DocumentRecord> {
        let delay = self.state.lock().unwrap().upload_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.uploads.push(file.filename.clone());

        if state.failing_uploads.contains(&file.filename) {
            return Err(BackendError::ApiError {
                status: 415,
                message: "unsupported file".to_string(),
            });
        }

        state.next_id += 1;
        let status = state.upload_status.unwrap_or(DocumentStatus::Analyzing);
        let record = DocumentRecord::new(state.next_id.to_string(), file.filename, status);
        state
            .documents
            .insert(record.id.to_string(), record.clone());
        Ok(record)
    }

    async fn recent_documents(&self) -> BackendResult<Vec<DocumentRecord>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<_> = state.documents.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn get_document(&self, id: &DocumentId) -> BackendResult<DocumentRecord> {
        let mut state = self.state.lock().unwrap();
        *state.gets.entry(id.to_string()).or_insert(0) += 1;

        let answer = state.scripts.get_mut(id.as_str()).and_then(|script| {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        });

        match answer {
            Some(Scripted::Fail) => Err(BackendError::Unavailable),
            Some(Scripted::Status(status)) => {
                let record = state.documents.get_mut(id.as_str()).ok_or_else(|| not_found(id))?;
                record.status = status;
                if status == DocumentStatus::Complete {
                    record.ai_confidence = Some(0.93);
                }
                Ok(record.clone())
            }
            None => state
                .documents
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| not_found(id)),
        }
    }

    async fn update_tags(
        &self,
        id: &DocumentId,
        update: &TagUpdate,
    ) -> BackendResult<DocumentRecord> {
        let mut state = self.state.lock().unwrap();
        state.tag_updates.push((id.to_string(), update.clone()));

        if state.fail_tag_updates {
            return Err(BackendError::Timeout);
        }

        let record = state.documents.get_mut(id.as_str()).ok_or_else(|| not_found(id))?;

        // The server keeps its workflow markers and replaces everything else
        let mut tags: Vec<TagRecord> = record
            .tags
            .iter()
            .filter(|t| t.tag == "status")
            .cloned()
            .collect();
        if let (Some(year), Some(month)) = (update.year, update.month) {
            if let Ok(period) = Period::new(year, month) {
                tags.push(TagRecord::from_tag(&Tag::period(period)));
            }
        }
        tags.extend(
            update
                .custom_tags
                .iter()
                .map(|v| TagRecord::from_tag(&Tag::custom(v.clone()))),
        );
        record.tags = tags;

        Ok(record.clone())
    }

    async fn add_to_records(&self, id: &DocumentId) -> BackendResult<()> {
        let delay = self.state.lock().unwrap().commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.commits.push(id.to_string());

        if state.failing_commits.contains(id.as_str()) {
            return Err(BackendError::ApiError {
                status: 500,
                message: "ledger unavailable".to_string(),
            });
        }

        let record = state.documents.get_mut(id.as_str()).ok_or_else(|| not_found(id))?;
        record
            .tags
            .push(TagRecord::from_tag(&Tag::added_to_records()));
        Ok(())
    }

    async fn delete_document(&self, id: &DocumentId) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(id.to_string());

        if state.fail_deletes {
            return Err(BackendError::Unavailable);
        }

        state.documents.remove(id.as_str());
        state.scripts.remove(id.as_str());
        Ok(())
    }
}
