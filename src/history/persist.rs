//! Background persistence of reflected snapshots.
//!
//! Handlers hand snapshots to a [`Persister`] and return immediately. A single
//! writer task drains the queue and appends each snapshot on the blocking
//! pool, retrying failed writes per [`RetryPolicy`]. The queue is bounded;
//! when it is full the snapshot is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::history::store::{HistoryStore, StoreError};
use crate::observability::metrics;
use crate::resilience::RetryPolicy;
use crate::snapshot::RequestSnapshot;

/// Sending half of the history queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Persister {
    tx: mpsc::Sender<RequestSnapshot>,
}

impl Persister {
    /// Queue `snapshot` for writing. Returns `false` when the queue is full
    /// or closed.
    pub fn enqueue(&self, snapshot: RequestSnapshot) -> bool {
        match self.tx.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(snapshot)) => {
                tracing::warn!(uri = snapshot.uri(), "History queue full, snapshot dropped");
                metrics::record_history_write("dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("History queue closed, snapshot dropped");
                metrics::record_history_write("dropped");
                false
            }
        }
    }
}

/// Owner of the writer task.
#[derive(Debug)]
pub struct PersistHandle {
    close_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl PersistHandle {
    /// Stop accepting snapshots and wait up to `deadline` for the queued ones
    /// to be written. Returns `false` if the deadline passed first; whatever
    /// is still queued at that point is lost.
    pub async fn close(self, deadline: Duration) -> bool {
        let _ = self.close_tx.send(());
        match tokio::time::timeout(deadline, self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "History writer task failed");
                false
            }
            Err(_) => {
                tracing::warn!(?deadline, "History queue not drained before deadline");
                false
            }
        }
    }
}

/// Start the writer task for `store`. At most `queue_capacity` snapshots
/// wait for the writer; `queue_capacity` must be non-zero.
pub fn spawn(
    store: Arc<HistoryStore>,
    policy: RetryPolicy,
    queue_capacity: usize,
) -> (Persister, PersistHandle) {
    let (tx, rx) = mpsc::channel(queue_capacity);
    let (close_tx, close_rx) = oneshot::channel();
    let join = tokio::spawn(run_writer(store, rx, close_rx, policy));
    (Persister { tx }, PersistHandle { close_tx, join })
}

async fn run_writer(
    store: Arc<HistoryStore>,
    mut rx: mpsc::Receiver<RequestSnapshot>,
    mut close_rx: oneshot::Receiver<()>,
    policy: RetryPolicy,
) {
    let mut closing = false;
    loop {
        let next = if closing {
            rx.recv().await
        } else {
            tokio::select! {
                next = rx.recv() => next,
                _ = &mut close_rx => {
                    // Refuse new work; what is already queued still drains.
                    rx.close();
                    closing = true;
                    continue;
                }
            }
        };

        match next {
            Some(snapshot) => persist(&store, snapshot, policy).await,
            None => break,
        }
    }
    tracing::debug!("History writer stopped");
}

async fn persist(store: &Arc<HistoryStore>, snapshot: RequestSnapshot, policy: RetryPolicy) {
    let mut attempt = 1;
    loop {
        match append_blocking(store, snapshot.clone()).await {
            Ok(len) => {
                tracing::trace!(entries = len, "Snapshot persisted");
                metrics::record_history_write("ok");
                return;
            }
            Err(e) if policy.should_retry(attempt) => {
                let delay = policy.delay(attempt);
                tracing::debug!(error = %e, attempt, ?delay, "History write failed, retrying");
                metrics::record_history_write("retry");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempts = attempt, uri = snapshot.uri(), "Snapshot not persisted");
                metrics::record_history_write("failed");
                return;
            }
        }
    }
}

async fn append_blocking(
    store: &Arc<HistoryStore>,
    snapshot: RequestSnapshot,
) -> Result<usize, StoreError> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.append(snapshot))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}
