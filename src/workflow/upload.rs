//! Upload Coordinator
//!
//! Turns submitted files into documents. Each file is shown immediately as a
//! provisional `uploading` entry under a temporary id, then sent to the
//! backend; the backend id replaces the temporary one in place and analysis
//! polling starts for anything not yet finished.

use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use super::error::{WorkflowError, WorkflowResult};
use super::notify::{Notification, NotificationLevel, Notifier};
use super::poller::StatusPoller;
use super::store::{DocumentStore, StoreError};
use crate::backend::DocumentBackend;
use crate::document::{Document, DocumentId, DocumentStatus, UploadFile};

/// Limits applied before a file is sent anywhere
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_bytes: usize,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 25 * 1024 * 1024,
            allowed_extensions: ["pdf", "png", "jpg", "jpeg", "xlsx", "xls", "csv"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl UploadConfig {
    /// Check a file against the extension allow-list and size limit
    pub fn validate(&self, file: &UploadFile) -> WorkflowResult<()> {
        let rejected = |reason: String| WorkflowError::Rejected {
            filename: file.filename.clone(),
            reason,
        };

        match file.extension() {
            Some(ext) if self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) => {}
            Some(ext) => return Err(rejected(format!("unsupported file type .{}", ext))),
            None => return Err(rejected("file has no extension".to_string())),
        }

        if file.size() > self.max_file_bytes {
            return Err(rejected(format!(
                "{} bytes exceeds the {} byte limit",
                file.size(),
                self.max_file_bytes
            )));
        }

        Ok(())
    }
}

/// What happened to one submitted file
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// Persisted; `status` is what the backend reported
    Uploaded { id: DocumentId, status: DocumentStatus },
    /// Backend refused or was unreachable; the provisional entry stays `uploading`
    Failed { temp_id: DocumentId, error: String },
    /// Refused locally, nothing was created
    Rejected { filename: String, reason: String },
    /// Entry was removed while uploading; the server copy was deleted again
    Discarded { id: DocumentId },
}

impl UploadOutcome {
    /// Backend id of a persisted upload
    pub fn id(&self) -> Option<&DocumentId> {
        match self {
            UploadOutcome::Uploaded { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

pub struct UploadCoordinator {
    backend: Arc<dyn DocumentBackend>,
    store: Arc<DocumentStore>,
    poller: Arc<StatusPoller>,
    notifier: Notifier,
    config: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        store: Arc<DocumentStore>,
        poller: Arc<StatusPoller>,
        notifier: Notifier,
        config: UploadConfig,
    ) -> Self {
        Self {
            backend,
            store,
            poller,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload a batch of files concurrently
    ///
    /// Outcomes are returned in submission order.
    pub async fn upload_batch(&self, files: Vec<UploadFile>) -> Vec<UploadOutcome> {
        tracing::info!(count = files.len(), "Uploading batch");
        join_all(files.into_iter().map(|file| self.upload_one(file))).await
    }

    /// Upload a single file
    pub async fn upload_one(&self, file: UploadFile) -> UploadOutcome {
        if let Err(e) = self.config.validate(&file) {
            self.notifier.error(e.to_string());
            return match e {
                WorkflowError::Rejected { filename, reason } => {
                    UploadOutcome::Rejected { filename, reason }
                }
                other => UploadOutcome::Rejected {
                    filename: file.filename,
                    reason: other.to_string(),
                },
            };
        }

        let provisional = Document::provisional(file.filename.clone());
        let temp_id = provisional.id.clone();
        let filename = file.filename.clone();
        self.store.upsert(provisional).await;

        tracing::debug!(document_id = %temp_id, filename = %filename, size = file.size(), "Sending upload");

        // Payload is moved into the call and released when it returns
        let record = match self.backend.upload_document(file).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(document_id = %temp_id, filename = %filename, error = %e, "Upload failed");
                self.notifier.send(
                    Notification::new(
                        NotificationLevel::Error,
                        format!("Failed to upload {}: {}", filename, e),
                    )
                    .document(&temp_id),
                );
                return UploadOutcome::Failed {
                    temp_id,
                    error: e.to_string(),
                };
            }
        };

        let id = record.id.clone();
        match self.store.replace_id(&temp_id, id.clone(), record.state()).await {
            Ok(document) => {
                tracing::info!(document_id = %id, status = %document.status, "Upload persisted");
                self.notifier.send(
                    Notification::new(NotificationLevel::Success, format!("Uploaded {}", filename))
                        .document(&id),
                );

                if document.status == DocumentStatus::Error {
                    self.notifier.send(
                        Notification::new(
                            NotificationLevel::Error,
                            format!("Analysis failed for {}", filename),
                        )
                        .document(&id),
                    );
                } else if !document.status.is_terminal() {
                    self.poller.spawn(id.clone()).await;
                }

                UploadOutcome::Uploaded {
                    id,
                    status: document.status,
                }
            }
            Err(StoreError::NotFound(_)) => {
                tracing::info!(document_id = %id, "Upload finished after removal, deleting server copy");
                if let Err(e) = self.backend.delete_document(&id).await {
                    tracing::warn!(document_id = %id, error = %e, "Could not delete orphaned upload");
                }
                UploadOutcome::Discarded { id }
            }
            Err(e) => {
                tracing::warn!(document_id = %temp_id, error = %e, "Could not adopt upload result");
                UploadOutcome::Failed {
                    temp_id,
                    error: e.to_string(),
                }
            }
        }
    }
}
