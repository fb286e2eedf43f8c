//! Poller pipeline - wires producer, worker pool and aggregator

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use pricer_core::{ConfigResult, PipelineError, PipelineResult, PollerConfig};
use crate::aggregator::{AggregatorStats, RecordSink, ResultAggregator};
use crate::lookup::PriceLookup;
use crate::producer::{ProducerStats, RequestProducer};
use crate::retry::{Clock, RetryPolicy};
use crate::worker::{SharedReceiver, Worker, WorkerStats};

/// Statistics of a finished pipeline run
#[derive(Debug, Clone, Default)]
pub struct PollerStats {
    pub producer: ProducerStats,
    pub workers: Vec<WorkerStats>,
    pub aggregator: AggregatorStats,
}

impl PollerStats {
    /// Observations handed to the aggregator
    pub fn delivered(&self) -> u64 {
        self.workers.iter().map(|w| w.resolved + w.failed).sum()
    }

    pub fn abandoned(&self) -> u64 {
        self.workers.iter().map(|w| w.abandoned).sum()
    }
}

/// Main price poller
pub struct PricePoller<L: PriceLookup + ?Sized> {
    config: PollerConfig,
    lookup: Arc<L>,
    policy: RetryPolicy,
}

impl<L: PriceLookup + ?Sized> PricePoller<L> {
    /// Validate `config` and build a poller; nothing runs until [`run`](Self::run)
    pub fn new(config: PollerConfig, lookup: Arc<L>) -> ConfigResult<Self> {
        config.validate()?;
        let policy = RetryPolicy::from_config(&config);

        Ok(Self { config, lookup, policy })
    }

    /// Replace the clock used for retry backoff
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.policy = self.policy.with_clock(clock);
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run the pipeline until `cancel` fires and everything has drained.
    ///
    /// Shutdown order: the producer stops and closes the request channel, the
    /// workers finish their current attempt and exit, and once all of them
    /// are joined the response channel is closed and the aggregator returns.
    pub async fn run<S: RecordSink>(&self, sink: S, cancel: CancellationToken) -> PipelineResult<PollerStats> {
        info!(
            "Starting price poller: {} keys, {} workers, interval {:?}, retry {} every {:?}, attempt timeout {:?}",
            self.config.keys.len(),
            self.config.worker_count,
            self.config.interval,
            self.config.retry_on.name(),
            self.policy.backoff(),
            self.policy.attempt_timeout()
        );

        let (request_tx, request_rx) = mpsc::channel(self.config.channel_capacity);
        let (response_tx, response_rx) = mpsc::channel(self.config.channel_capacity);

        let producer = RequestProducer::new(self.config.keys.clone(), self.config.interval, cancel.clone());
        let producer_handle = tokio::spawn(producer.run(request_tx));

        let requests: SharedReceiver = Arc::new(Mutex::new(request_rx));
        let worker_handles: Vec<_> = (0..self.config.worker_count)
            .map(|id| {
                let worker = Worker::new(id, Arc::clone(&self.lookup), self.policy.clone(), cancel.clone());
                tokio::spawn(worker.run(Arc::clone(&requests), response_tx.clone()))
            })
            .collect();
        drop(requests);
        // Only the workers hold response senders from here on.
        drop(response_tx);

        let aggregator_handle = tokio::spawn(ResultAggregator::new(sink).run(response_rx));

        let mut failure = None;

        let producer = producer_handle
            .await
            .unwrap_or_else(|e| record_failure(&mut failure, "producer", e));

        let mut workers = Vec::with_capacity(self.config.worker_count);
        for (id, result) in futures::future::join_all(worker_handles).await.into_iter().enumerate() {
            match result {
                Ok(stats) => workers.push(stats),
                Err(e) => workers.push(WorkerStats {
                    id,
                    ..record_failure(&mut failure, "worker", e)
                }),
            }
        }
        debug!("All {} workers stopped, response channel closed", workers.len());

        let aggregator = aggregator_handle
            .await
            .unwrap_or_else(|e| record_failure(&mut failure, "aggregator", e));

        if let Some(err) = failure {
            return Err(err);
        }

        let stats = PollerStats {
            producer,
            workers,
            aggregator,
        };
        info!(
            "Price poller stopped: {} requests, {} results, {} abandoned",
            stats.producer.emitted,
            stats.delivered(),
            stats.abandoned()
        );

        Ok(stats)
    }
}

fn record_failure<T: Default>(slot: &mut Option<PipelineError>, role: &str, err: JoinError) -> T {
    error!("{} task failed: {}", role, err);
    slot.get_or_insert(PipelineError::TaskFailed {
        role: role.to_string(),
        message: err.to_string(),
    });
    T::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use pricer_core::{ConfigError, LookupError, PriceKey, PriceRecord, Report, RetryOn};
    use crate::test_support::{Scripted, ScriptedLookup};

    #[test]
    fn test_invalid_config_fails_before_start() {
        let lookup = Arc::new(ScriptedLookup::new());

        let empty = PricePoller::new(PollerConfig::new(Vec::<String>::new()), lookup.clone());
        assert!(matches!(empty, Err(ConfigError::NoKeys)));

        let no_workers = PricePoller::new(PollerConfig::new(["BTC"]).with_workers(0), lookup.clone());
        assert!(matches!(no_workers, Err(ConfigError::ZeroWorkers)));

        let no_interval = PricePoller::new(PollerConfig::new(["BTC"]).with_interval(Duration::ZERO), lookup);
        assert!(matches!(no_interval, Err(ConfigError::ZeroInterval)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_two_cycles() {
        let lookup = Arc::new(
            ScriptedLookup::new()
                .script("BTC", [Scripted::Value(100.0), Scripted::Value(110.0)])
                .script("ETH", [Scripted::Value(200.0), Scripted::Value(190.0)]),
        );
        let config = PollerConfig::new(["BTC", "ETH"])
            .with_interval(Duration::from_secs(1))
            .with_workers(2);
        let poller = PricePoller::new(config, lookup).unwrap();

        let cancel = CancellationToken::new();
        let (sink, mut records) = mpsc::unbounded_channel::<Report>();
        let run = {
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(sink, cancel).await })
        };

        let mut by_key: HashMap<String, Vec<PriceRecord>> = HashMap::new();
        for _ in 0..4 {
            let report = records.recv().await.unwrap();
            let record = report.as_price().cloned().unwrap();
            by_key.entry(record.key.to_string()).or_default().push(record);
        }
        cancel.cancel();
        let stats = run.await.unwrap().unwrap();

        let btc = &by_key["BTC"];
        assert_eq!((btc[0].value, btc[0].previous_value, btc[0].percent_change), (100.0, None, None));
        assert_eq!((btc[1].value, btc[1].previous_value), (110.0, Some(100.0)));
        assert_eq!(btc[1].percent_change, Some(10.0));
        assert_eq!(btc[1].to_string(), "BTC: 110.00, 100.00, +10.00%");

        let eth = &by_key["ETH"];
        assert_eq!((eth[0].value, eth[0].previous_value, eth[0].percent_change), (200.0, None, None));
        assert_eq!((eth[1].value, eth[1].previous_value), (190.0, Some(200.0)));
        assert!((eth[1].percent_change.unwrap() + 5.0).abs() < 1e-9);
        assert_eq!(eth[1].to_string(), "ETH: 190.00, 200.00, -5.00%");

        assert!(stats.producer.emitted >= 4);
        assert_eq!(stats.workers.len(), 2);
        assert_eq!(stats.aggregator.last_observed[&PriceKey::new("BTC")], 110.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_liveness_while_retrying() {
        let lookup = Arc::new(ScriptedLookup::new().failing_with(LookupError::Transport("unavailable".into())));
        let config = PollerConfig::new(["BTC", "ETH", "USDT"])
            .with_interval(Duration::from_secs(3))
            .with_workers(2)
            .with_retry_backoff(Duration::from_secs(3))
            .with_attempt_timeout(Duration::from_secs(1));
        let bound = config.retry_backoff + config.attempt_timeout;
        let poller = PricePoller::new(config, lookup.clone()).unwrap();

        let cancel = CancellationToken::new();
        let (sink, mut records) = mpsc::unbounded_channel::<Report>();
        let run = {
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(sink, cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(7_300)).await;
        cancel.cancel();

        let stats = tokio::time::timeout(bound, run)
            .await
            .expect("pipeline did not stop in time")
            .unwrap()
            .unwrap();

        assert_eq!(stats.delivered(), 0);
        assert_eq!(stats.abandoned(), 2);
        assert!(lookup.total_calls() > 2);
        assert!(records.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_liveness_with_hanging_lookup() {
        let lookup = Arc::new(
            ScriptedLookup::new()
                .script("BTC", [Scripted::Hang])
                .script("ETH", [Scripted::Hang]),
        );
        let config = PollerConfig::new(["BTC", "ETH"])
            .with_workers(2)
            .with_attempt_timeout(Duration::from_secs(1));
        let bound = config.retry_backoff + config.attempt_timeout;
        let poller = PricePoller::new(config, lookup.clone()).unwrap();

        let cancel = CancellationToken::new();
        let run = {
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(NoRecordsSink, cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(lookup.max_in_flight(), 2);
        cancel.cancel();
        cancel.cancel();

        let stats = tokio::time::timeout(bound, run).await.unwrap().unwrap().unwrap();
        assert_eq!(stats.delivered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failures_reach_the_record_stream() {
        let lookup = Arc::new(
            ScriptedLookup::new()
                .script("BTC", [Scripted::Value(100.0)])
                .script("NOPE", [Scripted::Fail(LookupError::UnknownKey("NOPE".into()))]),
        );
        let config = PollerConfig::new(["BTC", "NOPE"]).with_workers(1);
        let poller = PricePoller::new(config, lookup).unwrap();

        let cancel = CancellationToken::new();
        let (sink, mut records) = mpsc::unbounded_channel::<Report>();
        let run = {
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(sink, cancel).await })
        };

        let first = records.recv().await.unwrap();
        let second = records.recv().await.unwrap();
        cancel.cancel();
        let stats = run.await.unwrap().unwrap();

        assert!(matches!(first, Report::Price(ref r) if r.value == 100.0));
        assert!(matches!(second, Report::Failure(ref f) if f.key.as_str() == "NOPE"));
        assert_eq!(stats.aggregator.failures, 1);
        assert!(!stats.aggregator.last_observed.contains_key(&PriceKey::new("NOPE")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_error_policy_retries_terminal_failures() {
        let lookup = Arc::new(ScriptedLookup::new().script(
            "SOL",
            [
                Scripted::Fail(LookupError::UnknownKey("SOL".into())),
                Scripted::Fail(LookupError::Rejected("not listed yet".into())),
                Scripted::Value(25.0),
            ],
        ));
        let config = PollerConfig::new(["SOL"])
            .with_interval(Duration::from_secs(60))
            .with_workers(1)
            .with_retry_on(RetryOn::AnyError);
        let poller = PricePoller::new(config, lookup.clone()).unwrap();
        assert_eq!(poller.config().retry_on, RetryOn::AnyError);

        let cancel = CancellationToken::new();
        let (sink, mut records) = mpsc::unbounded_channel::<Report>();
        let run = {
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(sink, cancel).await })
        };

        let first = records.recv().await.unwrap();
        cancel.cancel();
        let stats = run.await.unwrap().unwrap();

        assert!(matches!(first, Report::Price(ref r) if r.value == 25.0));
        assert_eq!(stats.aggregator.failures, 0);
        assert_eq!(lookup.calls(&PriceKey::new("SOL")), 3);
        assert_eq!(stats.workers[0].attempts, 3);
    }

    struct NoRecordsSink;

    impl RecordSink for NoRecordsSink {
        fn record(&mut self, report: &Report) {
            panic!("unexpected record: {:?}", report);
        }
    }
}
