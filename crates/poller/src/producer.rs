//! Fixed-cadence request producer

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pricer_core::{PriceKey, WorkItem};

/// Producer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Sweeps started, including one cut short by cancellation
    pub cycles: u64,
    pub emitted: u64,
}

/// Emits one work item per key every interval
pub struct RequestProducer {
    keys: Vec<PriceKey>,
    interval: Duration,
    cancel: CancellationToken,
}

impl RequestProducer {
    pub fn new(keys: Vec<PriceKey>, interval: Duration, cancel: CancellationToken) -> Self {
        Self { keys, interval, cancel }
    }

    /// Run until cancelled or until every receiver is gone.
    ///
    /// The first sweep starts immediately. Sends block while the workers are
    /// busy. `requests` is dropped on return, which closes the channel.
    pub async fn run(self, requests: mpsc::Sender<WorkItem>) -> ProducerStats {
        info!("Starting request producer: {} keys every {:?}", self.keys.len(), self.interval);

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = ProducerStats::default();

        'sweeps: loop {
            stats.cycles += 1;

            for key in &self.keys {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'sweeps,
                    sent = requests.send(WorkItem::new(key.clone())) => {
                        if sent.is_err() {
                            debug!("Request channel closed by workers");
                            break 'sweeps;
                        }
                        stats.emitted += 1;
                    }
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break 'sweeps,
                _ = ticker.tick() => {}
            }
        }

        drop(requests);
        info!("Request producer stopped after {} cycles, {} requests", stats.cycles, stats.emitted);
        stats
    }
}
