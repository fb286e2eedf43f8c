//! Result aggregator - single consumer of the response channel

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pricer_core::{FailureRecord, Observation, PriceKey, PriceRecord, Report};

/// Destination of the aggregator's record stream
pub trait RecordSink: Send + 'static {
    fn record(&mut self, report: &Report);
}

/// Writes records as structured tracing events under `pricer::records`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn record(&mut self, report: &Report) {
        match report {
            Report::Price(r) => info!(
                target: "pricer::records",
                key = %r.key,
                value = r.value,
                previous_value = ?r.previous_value,
                percent_change = ?r.percent_change,
                "{}",
                r
            ),
            Report::Failure(r) => warn!(
                target: "pricer::records",
                key = %r.key,
                attempts = r.attempts,
                error = %r.error,
                "{}",
                r
            ),
        }
    }
}

/// Forwards records to another task; records are dropped once the receiver is gone
impl RecordSink for mpsc::UnboundedSender<Report> {
    fn record(&mut self, report: &Report) {
        if self.send(report.clone()).is_err() {
            debug!(key = %report.key(), "Record receiver dropped");
        }
    }
}

/// Aggregator statistics, returned when the response channel closes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatorStats {
    pub records: u64,
    pub failures: u64,
    /// Latest value per key at shutdown
    pub last_observed: HashMap<PriceKey, f64>,
}

/// Keeps the latest value per key and turns observations into records
pub struct ResultAggregator<S: RecordSink> {
    sink: S,
    last_observed: HashMap<PriceKey, f64>,
    records: u64,
    failures: u64,
}

impl<S: RecordSink> ResultAggregator<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            last_observed: HashMap::new(),
            records: 0,
            failures: 0,
        }
    }

    /// Last value seen for `key`
    pub fn last_observed(&self, key: &PriceKey) -> Option<f64> {
        self.last_observed.get(key).copied()
    }

    /// Record one observation and return the emitted report.
    ///
    /// Failures are reported but never replace the last observed value.
    pub fn observe(&mut self, observation: Observation) -> Report {
        let Observation { key, outcome, attempts, observed_at } = observation;

        let report = match outcome {
            Ok(value) => {
                let previous = self.last_observed.insert(key.clone(), value);
                self.records += 1;
                Report::Price(PriceRecord::new(key, value, previous, observed_at))
            }
            Err(error) => {
                self.failures += 1;
                Report::Failure(FailureRecord {
                    key,
                    error: error.to_string(),
                    attempts,
                    observed_at,
                })
            }
        };

        self.sink.record(&report);
        report
    }

    /// Drain `responses` until every sender is gone
    pub async fn run(mut self, mut responses: mpsc::Receiver<Observation>) -> AggregatorStats {
        debug!("Result aggregator started");

        while let Some(observation) = responses.recv().await {
            self.observe(observation);
        }

        info!(
            "Result aggregator stopped: {} records, {} failures, {} keys tracked",
            self.records,
            self.failures,
            self.last_observed.len()
        );

        AggregatorStats {
            records: self.records,
            failures: self.failures,
            last_observed: self.last_observed,
        }
    }
}
