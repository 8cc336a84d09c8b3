use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::point::TrackedPoint;
use crate::repository::{LocationRepository, StorageError};
use crate::state_machine::tracking::{StorageFailure, StorageRequest};

pub(crate) enum StorageOp {
    Save(Vec<TrackedPoint>),
    Clear,
    /// Answered once every operation queued before it has finished.
    Flush(oneshot::Sender<()>),
}

impl From<StorageRequest> for StorageOp {
    fn from(request: StorageRequest) -> Self {
        match request {
            StorageRequest::Save(history) => StorageOp::Save(history),
            StorageRequest::Clear => StorageOp::Clear,
        }
    }
}

/// Start the single writer of `repository`.
///
/// Operations run one at a time in queue order on the blocking pool. Failures are reported
/// through `failures` and never stop the worker. The worker exits once every sender of the
/// returned queue is dropped and the queue is drained.
pub(crate) fn spawn_worker(
    repository: Arc<dyn LocationRepository>,
    failures: mpsc::UnboundedSender<StorageFailure>,
) -> (mpsc::UnboundedSender<StorageOp>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_worker(repository, rx, failures));
    (tx, handle)
}

async fn run_worker(
    repository: Arc<dyn LocationRepository>,
    mut ops: mpsc::UnboundedReceiver<StorageOp>,
    failures: mpsc::UnboundedSender<StorageFailure>,
) {
    let mut deferred = None;

    loop {
        let op = match deferred.take() {
            Some(op) => op,
            None => match ops.recv().await {
                Some(op) => op,
                None => break,
            },
        };

        match op {
            StorageOp::Save(history) => {
                let (history, superseded, next) = coalesce_saves(history, &mut ops);
                deferred = next;

                let count = history.len();
                let repo = Arc::clone(&repository);
                match run_blocking(move || repo.save(&history)).await {
                    Ok(()) => debug!(count, superseded, "Persisted tracked locations"),
                    Err(detail) => {
                        warn!(error = %detail, "Failed to persist tracked locations");
                        let _ = failures.send(StorageFailure::Save(detail));
                    }
                }
            }

            StorageOp::Clear => {
                let repo = Arc::clone(&repository);
                match run_blocking(move || repo.clear()).await {
                    Ok(()) => debug!("Cleared persisted tracked locations"),
                    Err(detail) => {
                        warn!(error = %detail, "Failed to clear persisted tracked locations");
                        let _ = failures.send(StorageFailure::Clear(detail));
                    }
                }
            }

            StorageOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Persistence worker stopped");
}

/// Replace `history` with the newest snapshot among the saves queued directly behind it.
///
/// Returns the snapshot to write, how many queued saves it replaced, and the first
/// non-save operation found, which has to run next.
fn coalesce_saves(
    mut history: Vec<TrackedPoint>,
    ops: &mut mpsc::UnboundedReceiver<StorageOp>,
) -> (Vec<TrackedPoint>, usize, Option<StorageOp>) {
    let mut superseded = 0;

    while let Ok(op) = ops.try_recv() {
        match op {
            StorageOp::Save(newer) => {
                history = newer;
                superseded += 1;
            }
            other => return (history, superseded, Some(other)),
        }
    }

    (history, superseded, None)
}

/// Load persisted history off the async runtime.
pub(crate) async fn load(repository: &Arc<dyn LocationRepository>) -> Result<Vec<TrackedPoint>, String> {
    let repo = Arc::clone(repository);
    run_blocking(move || repo.load()).await
}

async fn run_blocking<T, F>(op: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => {
            error!(error = %e, "Storage task panicked");
            Err(format!("storage task failed: {e}"))
        }
    }
}
