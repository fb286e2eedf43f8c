//! Concurrent price polling pipeline
//!
//! Features:
//! - Fixed-cadence request producer with channel backpressure
//! - Bounded worker pool with per-attempt timeout and fixed-backoff retry
//! - Single-consumer aggregator computing per-key percent change
//! - Cooperative cancellation with an orderly drain on shutdown

pub mod aggregator;
pub mod lookup;
pub mod pipeline;
pub mod producer;
pub mod retry;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregator::{AggregatorStats, RecordSink, ResultAggregator, TracingSink};
pub use lookup::PriceLookup;
pub use pipeline::{PollerStats, PricePoller};
pub use producer::{ProducerStats, RequestProducer};
pub use retry::{Clock, FetchOutcome, RetryPolicy, TokioClock};
pub use worker::{Worker, WorkerStats};
