//! Status Poller
//!
//! Follows each document through analysis by asking the backend for its
//! current state until a terminal status shows up. Every document gets its own
//! tokio task; loops never wait on each other.
//!
//! ```text
//! spawn(id) ─▶ sleep(initial_delay) ─▶ get_document ─▶ apply to store
//!                      ▲                                   │
//!                      └──── sleep(interval | backoff) ◀───┘ (non-terminal)
//! ```
//!
//! Each loop owns a cancellation token. Deleting the document or shutting the
//! workspace down cancels it; a response that lands after cancellation, or for
//! a document that is no longer in the store, is discarded.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::notify::{Notification, NotificationLevel, Notifier};
use super::store::{DocumentStore, StoreError};
use crate::backend::DocumentBackend;
use crate::document::{DocumentError, DocumentId, DocumentStatus};

/// Timing and give-up policy for polling loops
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wait before the first poll
    pub initial_delay: Duration,
    /// Wait between polls while the backend answers
    pub interval: Duration,
    /// Upper bound for the failure backoff
    pub max_backoff: Duration,
    /// Consecutive failed polls before giving up
    pub max_consecutive_failures: u32,
    /// Total polls before giving up on a document that never finishes
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(3),
            max_backoff: Duration::from_secs(30),
            max_consecutive_failures: 10,
            max_attempts: 200,
        }
    }
}

impl PollConfig {
    /// Delay after `failures` consecutive failed polls: interval doubled per failure, capped
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.min(16));
        self.interval.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Why a loop stopped before seeing a terminal status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GiveUpReason {
    TooManyFailures,
    AttemptsExhausted,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GiveUpReason::TooManyFailures => write!(f, "too many failed status checks"),
            GiveUpReason::AttemptsExhausted => write!(f, "analysis is taking too long"),
        }
    }
}

/// How a polling loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Backend reported a terminal status
    Finished { status: DocumentStatus, polls: u32 },
    /// Loop was cancelled (delete, shutdown)
    Cancelled { polls: u32 },
    /// Document disappeared from the store
    Removed { polls: u32 },
    GaveUp { polls: u32, reason: GiveUpReason },
}

impl PollOutcome {
    /// Number of status fetches the loop issued
    pub fn polls(&self) -> u32 {
        match self {
            PollOutcome::Finished { polls, .. }
            | PollOutcome::Cancelled { polls }
            | PollOutcome::Removed { polls }
            | PollOutcome::GaveUp { polls, .. } => *polls,
        }
    }
}

struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<PollOutcome>,
}

/// Everything a loop needs, cloned into its task
#[derive(Clone)]
struct PollContext {
    backend: Arc<dyn DocumentBackend>,
    store: Arc<DocumentStore>,
    notifier: Notifier,
    config: PollConfig,
}

/// Runs one polling loop per non-terminal document
pub struct StatusPoller {
    ctx: PollContext,
    tasks: Mutex<HashMap<DocumentId, PollTask>>,
}

impl StatusPoller {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        store: Arc<DocumentStore>,
        notifier: Notifier,
        config: PollConfig,
    ) -> Self {
        Self {
            ctx: PollContext {
                backend,
                store,
                notifier,
                config,
            },
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.ctx.config
    }

    /// Start polling a document
    ///
    /// Returns false if a loop for this id is already running.
    pub async fn spawn(&self, id: DocumentId) -> bool {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, task| !task.handle.is_finished());

        if tasks.contains_key(&id) {
            tracing::debug!(document_id = %id, "Already polling");
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_poll_loop(
            self.ctx.clone(),
            id.clone(),
            token.clone(),
        ));

        tracing::debug!(document_id = %id, "Started status polling");
        tasks.insert(id, PollTask { token, handle });
        true
    }

    /// Cancel one loop; returns whether a live loop was found
    pub async fn cancel(&self, id: &DocumentId) -> bool {
        match self.tasks.lock().await.get(id) {
            Some(task) if !task.handle.is_finished() => {
                task.token.cancel();
                tracing::debug!(document_id = %id, "Cancelled status polling");
                true
            }
            _ => false,
        }
    }

    /// Cancel every loop
    pub async fn cancel_all(&self) {
        let tasks = self.tasks.lock().await;
        for task in tasks.values() {
            task.token.cancel();
        }
        tracing::debug!(count = tasks.len(), "Cancelled all status polling");
    }

    pub async fn is_polling(&self, id: &DocumentId) -> bool {
        self.tasks
            .lock()
            .await
            .get(id)
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|task| !task.handle.is_finished())
            .count()
    }

    /// Wait for one loop to end and return its outcome
    ///
    /// `None` if no loop was started for this id, or its outcome was already taken.
    pub async fn wait(&self, id: &DocumentId) -> Option<PollOutcome> {
        let task = self.tasks.lock().await.remove(id)?;
        join(id, task).await
    }

    /// Wait for every loop started so far
    pub async fn wait_all(&self) -> Vec<(DocumentId, PollOutcome)> {
        let tasks: Vec<_> = self.tasks.lock().await.drain().collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (id, task) in tasks {
            if let Some(outcome) = join(&id, task).await {
                outcomes.push((id, outcome));
            }
        }
        outcomes
    }
}

async fn join(id: &DocumentId, task: PollTask) -> Option<PollOutcome> {
    match task.handle.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!(document_id = %id, error = %e, "Polling task failed");
            None
        }
    }
}

async fn run_poll_loop(ctx: PollContext, id: DocumentId, token: CancellationToken) -> PollOutcome {
    let config = &ctx.config;
    let mut polls = 0u32;
    let mut failures = 0u32;
    let mut delay = config.initial_delay;

    loop {
        tokio::select! {
            _ = token.cancelled() => return PollOutcome::Cancelled { polls },
            _ = tokio::time::sleep(delay) => {}
        }

        if polls >= config.max_attempts {
            give_up(&ctx, &id, GiveUpReason::AttemptsExhausted).await;
            return PollOutcome::GaveUp {
                polls,
                reason: GiveUpReason::AttemptsExhausted,
            };
        }

        polls += 1;
        let result = tokio::select! {
            _ = token.cancelled() => return PollOutcome::Cancelled { polls },
            result = ctx.backend.get_document(&id) => result,
        };

        // Response raced with cancellation
        if token.is_cancelled() {
            tracing::debug!(document_id = %id, "Discarding status after cancellation");
            return PollOutcome::Cancelled { polls };
        }

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    document_id = %id,
                    attempt = polls,
                    failures,
                    error = %e,
                    "Status check failed"
                );

                if failures >= config.max_consecutive_failures {
                    give_up(&ctx, &id, GiveUpReason::TooManyFailures).await;
                    return PollOutcome::GaveUp {
                        polls,
                        reason: GiveUpReason::TooManyFailures,
                    };
                }

                delay = config.backoff(failures);
                continue;
            }
        };

        failures = 0;
        delay = config.interval;

        let status = record.status;
        match ctx.store.apply_state(&id, record.state()).await {
            Ok(document) => {
                tracing::debug!(document_id = %id, status = %status, polls, "Status updated");

                if status.is_terminal() {
                    announce(&ctx.notifier, &document.filename, &id, status);
                    return PollOutcome::Finished { status, polls };
                }
            }
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(document_id = %id, "Document removed, discarding status");
                return PollOutcome::Removed { polls };
            }
            Err(StoreError::Document(DocumentError::StatusRegression { from, to })) => {
                tracing::warn!(document_id = %id, %from, %to, "Ignoring stale status");
                if from.is_terminal() {
                    return PollOutcome::Finished { status: from, polls };
                }
            }
            Err(e) => {
                tracing::warn!(document_id = %id, error = %e, "Could not apply status");
            }
        }
    }
}

fn announce(notifier: &Notifier, filename: &str, id: &DocumentId, status: DocumentStatus) {
    let notification = match status {
        DocumentStatus::Complete => Notification::new(
            NotificationLevel::Success,
            format!("{} analysed", filename),
        ),
        _ => Notification::new(
            NotificationLevel::Error,
            format!("Analysis failed for {}", filename),
        ),
    };
    notifier.send(notification.document(id));
}

async fn give_up(ctx: &PollContext, id: &DocumentId, reason: GiveUpReason) {
    let filename = ctx
        .store
        .get(id)
        .await
        .map(|d| d.filename)
        .unwrap_or_else(|| id.to_string());

    tracing::warn!(document_id = %id, %reason, "Stopped status polling");
    ctx.notifier.error(format!(
        "Stopped checking {}: {}. Refresh later or re-upload.",
        filename, reason
    ));
}
