use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};

/// What the real-time channel reports once the server has finished
/// processing an asynchronous upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPush {
    pub file_id: String,
    pub file_url: String,
}

struct PendingEntry {
    token: u64,
    sender: oneshot::Sender<CompletionPush>,
}

/// Uploads waiting for their completion push, keyed by server file id.
///
/// Each entry is a one-shot signal: the uploader registers right after the
/// HTTP ack names the file id and the real-time listener resolves it. An
/// entry disappears when it is resolved, cancelled, or its waiter goes away.
#[derive(Default)]
pub struct CompletionRegistry {
    pending: Mutex<HashMap<String, PendingEntry>>,
    next_token: AtomicU64,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(self: &Arc<Self>, file_id: &str) -> AppResult<PendingCompletion> {
        let (sender, receiver) = oneshot::channel();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        {
            let mut entries = self.entries();
            if entries.contains_key(file_id) {
                return Err(AppError::DuplicateCompletion {
                    file_id: file_id.to_string(),
                });
            }
            entries.insert(file_id.to_string(), PendingEntry { token, sender });
        }

        log::debug!("Waiting for completion push of file {}", file_id);

        Ok(PendingCompletion {
            file_id: file_id.to_string(),
            token,
            receiver,
            registry: Arc::clone(self),
        })
    }

    /// Deliver a push. Returns `false` when nobody is waiting for `file_id`.
    pub fn resolve(&self, file_id: &str, push: CompletionPush) -> bool {
        let entry = self.entries().remove(file_id);
        match entry {
            Some(entry) => {
                if entry.sender.send(push).is_err() {
                    log::debug!("Waiter for file {} went away before its push", file_id);
                    return false;
                }
                true
            }
            None => {
                log::debug!("Dropping completion push for unknown file {}", file_id);
                false
            }
        }
    }

    /// Abandon one pending upload; its waiter fails with `Cancelled`.
    pub fn cancel(&self, file_id: &str) -> bool {
        self.entries().remove(file_id).is_some()
    }

    pub fn is_pending(&self, file_id: &str) -> bool {
        self.entries().contains_key(file_id)
    }

    pub fn pending_count(&self) -> usize {
        self.entries().len()
    }

    fn forget(&self, file_id: &str, token: u64) {
        let mut entries = self.entries();
        if entries.get(file_id).is_some_and(|entry| entry.token == token) {
            entries.remove(file_id);
        }
    }
}

enum WaitOutcome {
    Pushed(CompletionPush),
    Closed,
    TimedOut,
    Cancelled,
}

/// The waiting half of a registry entry. Dropping it removes the entry.
pub struct PendingCompletion {
    file_id: String,
    token: u64,
    receiver: oneshot::Receiver<CompletionPush>,
    registry: Arc<CompletionRegistry>,
}

impl PendingCompletion {
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub async fn wait(
        mut self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> AppResult<CompletionPush> {
        let outcome = {
            let receiver = &mut self.receiver;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => WaitOutcome::Cancelled,
                outcome = receive(receiver, timeout) => outcome,
            }
        };

        match outcome {
            WaitOutcome::Pushed(push) => Ok(push),
            WaitOutcome::TimedOut => {
                log::warn!("No completion push for file {} within {:?}", self.file_id, timeout);
                Err(AppError::CompletionTimeout {
                    file_id: self.file_id.clone(),
                })
            }
            WaitOutcome::Closed | WaitOutcome::Cancelled => Err(AppError::Cancelled {
                file_id: self.file_id.clone(),
            }),
        }
    }
}

async fn receive(
    receiver: &mut oneshot::Receiver<CompletionPush>,
    timeout: Option<Duration>,
) -> WaitOutcome {
    let received = match timeout {
        Some(limit) => match tokio::time::timeout(limit, receiver).await {
            Ok(received) => received,
            Err(_) => return WaitOutcome::TimedOut,
        },
        None => receiver.await,
    };

    match received {
        Ok(push) => WaitOutcome::Pushed(push),
        Err(_) => WaitOutcome::Closed,
    }
}

impl Drop for PendingCompletion {
    fn drop(&mut self) {
        self.registry.forget(&self.file_id, self.token);
    }
}
