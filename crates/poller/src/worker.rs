//! Pool worker: pulls work items and resolves them with retry

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use pricer_core::{Observation, WorkItem};
use crate::lookup::PriceLookup;
use crate::retry::{FetchOutcome, RetryPolicy};

/// Request channel end shared by every worker of a pool
pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<WorkItem>>>;

/// Per-worker statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: usize,
    /// Items resolved with a value
    pub resolved: u64,
    /// Items resolved with a terminal failure
    pub failed: u64,
    /// Items dropped because of cancellation
    pub abandoned: u64,
    pub attempts: u64,
}

pub struct Worker<L: PriceLookup + ?Sized> {
    id: usize,
    lookup: Arc<L>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<L: PriceLookup + ?Sized> Worker<L> {
    pub fn new(id: usize, lookup: Arc<L>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { id, lookup, policy, cancel }
    }

    /// Process work items until the request channel is closed and drained,
    /// or until cancellation.
    ///
    /// `responses` is dropped on return; the response channel closes once
    /// every worker has returned.
    pub async fn run(self, requests: SharedReceiver, responses: mpsc::Sender<Observation>) -> WorkerStats {
        debug!(worker = self.id, "Worker started");
        let mut stats = WorkerStats {
            id: self.id,
            ..Default::default()
        };

        while let Some(item) = self.next_item(&requests).await {
            debug!(worker = self.id, key = %item.key, "Fetching price");

            match self.policy.fetch(&*self.lookup, &item.key, &self.cancel).await {
                FetchOutcome::Resolved(observation) => {
                    stats.attempts += u64::from(observation.attempts);
                    if observation.is_success() {
                        stats.resolved += 1;
                    } else {
                        stats.failed += 1;
                    }

                    if responses.send(observation).await.is_err() {
                        warn!(worker = self.id, "Response channel closed, stopping worker");
                        break;
                    }
                }
                FetchOutcome::Cancelled { attempts } => {
                    stats.attempts += u64::from(attempts);
                    stats.abandoned += 1;
                    debug!(worker = self.id, key = %item.key, "Abandoned work item on cancellation");
                    break;
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
        }

        drop(responses);
        debug!(
            worker = self.id,
            resolved = stats.resolved,
            failed = stats.failed,
            abandoned = stats.abandoned,
            "Worker stopped"
        );
        stats
    }

    async fn next_item(&self, requests: &SharedReceiver) -> Option<WorkItem> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = async { requests.lock().await.recv().await } => item,
        }
    }
}
