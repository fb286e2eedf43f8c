//! Retry policy for a single work item

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use pricer_core::{LookupError, LookupResult, Observation, PollerConfig, PriceKey, RetryOn};
use crate::lookup::PriceLookup;

/// Source of backoff waits
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How a work item ended
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A value, or a failure the policy does not retry
    Resolved(Observation),
    /// Cancellation fired before a result was produced
    Cancelled { attempts: u32 },
}

/// Per-item retry policy: fixed backoff between attempts, bounded attempts,
/// unbounded retry count.
///
/// Every wait is its own timer, so workers never share backoff pacing.
#[derive(Clone)]
pub struct RetryPolicy {
    backoff: Duration,
    attempt_timeout: Duration,
    retry_on: RetryOn,
    clock: Arc<dyn Clock>,
}

impl RetryPolicy {
    pub fn new(backoff: Duration, attempt_timeout: Duration, retry_on: RetryOn) -> Self {
        Self {
            backoff,
            attempt_timeout,
            retry_on,
            clock: Arc::new(TokioClock),
        }
    }

    pub fn from_config(config: &PollerConfig) -> Self {
        Self::new(config.retry_backoff, config.attempt_timeout, config.retry_on)
    }

    /// Replace the clock used for backoff waits
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn should_retry(&self, error: &LookupError) -> bool {
        match self.retry_on {
            RetryOn::AnyError => true,
            RetryOn::TransientOnly => error.is_transient(),
        }
    }

    /// One lookup bounded by the attempt timeout
    pub async fn attempt<L>(&self, lookup: &L, key: &PriceKey) -> LookupResult<f64>
    where
        L: PriceLookup + ?Sized,
    {
        match tokio::time::timeout(self.attempt_timeout, lookup.price(key, self.attempt_timeout)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout {
                timeout_ms: self.attempt_timeout.as_millis() as u64,
            }),
        }
    }

    /// Look up `key` until it resolves or `cancel` fires.
    ///
    /// Cancellation is checked before each attempt and during each backoff
    /// wait; an attempt already in flight runs to completion or timeout.
    pub async fn fetch<L>(&self, lookup: &L, key: &PriceKey, cancel: &CancellationToken) -> FetchOutcome
    where
        L: PriceLookup + ?Sized,
    {
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return FetchOutcome::Cancelled { attempts };
            }

            attempts += 1;
            let error = match self.attempt(lookup, key).await {
                Ok(value) => return FetchOutcome::Resolved(Observation::success(key.clone(), value, attempts)),
                Err(e) => e,
            };

            if !self.should_retry(&error) {
                warn!(
                    key = %key,
                    attempts,
                    error = %error,
                    "{} lookup failed permanently",
                    lookup.name()
                );
                return FetchOutcome::Resolved(Observation::failure(key.clone(), error, attempts));
            }

            warn!(
                key = %key,
                attempt = attempts,
                error = %error,
                "{} lookup failed, retrying in {:?}",
                lookup.name(),
                self.backoff
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(key = %key, "Cancelled during retry backoff");
                    return FetchOutcome::Cancelled { attempts };
                }
                _ = self.clock.sleep(self.backoff) => {}
            }
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("backoff", &self.backoff)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retry_on", &self.retry_on)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingClock, Scripted, ScriptedLookup};

    fn policy(retry_on: RetryOn, clock: Arc<RecordingClock>) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(3), Duration::from_secs(1), retry_on).with_clock(clock)
    }

    #[tokio::test]
    async fn test_retries_transient_failures_until_success() {
        let key = PriceKey::new("BTC");
        let lookup = ScriptedLookup::new().script(
            "BTC",
            [
                Scripted::Fail(LookupError::Transport("connection refused".into())),
                Scripted::Fail(LookupError::Timeout { timeout_ms: 1000 }),
                Scripted::Fail(LookupError::Transport("reset by peer".into())),
                Scripted::Value(42.5),
            ],
        );
        let clock = Arc::new(RecordingClock::default());
        let cancel = CancellationToken::new();

        let outcome = policy(RetryOn::TransientOnly, Arc::clone(&clock))
            .fetch(&lookup, &key, &cancel)
            .await;

        match outcome {
            FetchOutcome::Resolved(obs) => {
                assert_eq!(obs.outcome, Ok(42.5));
                assert_eq!(obs.attempts, 4);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3); 3]);
        assert_eq!(lookup.calls(&key), 4);
    }

    #[tokio::test]
    async fn test_terminal_error_surfaces_without_retry() {
        let key = PriceKey::new("DOGE");
        let lookup = ScriptedLookup::new().script("DOGE", [Scripted::Fail(LookupError::UnknownKey("DOGE".into()))]);
        let clock = Arc::new(RecordingClock::default());

        let outcome = policy(RetryOn::TransientOnly, Arc::clone(&clock))
            .fetch(&lookup, &key, &CancellationToken::new())
            .await;

        match outcome {
            FetchOutcome::Resolved(obs) => {
                assert_eq!(obs.outcome, Err(LookupError::UnknownKey("DOGE".into())));
                assert_eq!(obs.attempts, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_any_error_policy_retries_terminal_errors() {
        let key = PriceKey::new("DOGE");
        let lookup = ScriptedLookup::new().script(
            "DOGE",
            [
                Scripted::Fail(LookupError::UnknownKey("DOGE".into())),
                Scripted::Fail(LookupError::Rejected("bad request".into())),
                Scripted::Value(0.1),
            ],
        );
        let clock = Arc::new(RecordingClock::default());

        let outcome = policy(RetryOn::AnyError, Arc::clone(&clock))
            .fetch(&lookup, &key, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, FetchOutcome::Resolved(ref obs) if obs.outcome == Ok(0.1)));
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_times_out_and_retries() {
        let key = PriceKey::new("ETH");
        let lookup = ScriptedLookup::new().script("ETH", [Scripted::Hang, Scripted::Value(200.0)]);
        let clock = Arc::new(RecordingClock::default());
        let started = tokio::time::Instant::now();

        let outcome = policy(RetryOn::TransientOnly, Arc::clone(&clock))
            .fetch(&lookup, &key, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, FetchOutcome::Resolved(ref obs) if obs.outcome == Ok(200.0) && obs.attempts == 2));
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_attempt() {
        let key = PriceKey::new("BTC");
        let lookup = ScriptedLookup::new().script("BTC", [Scripted::Value(1.0)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = RetryPolicy::new(Duration::from_secs(3), Duration::from_secs(1), RetryOn::TransientOnly)
            .fetch(&lookup, &key, &cancel)
            .await;

        assert_eq!(outcome, FetchOutcome::Cancelled { attempts: 0 });
        assert_eq!(lookup.calls(&key), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_backoff() {
        let key = PriceKey::new("BTC");
        let lookup = ScriptedLookup::new().failing_with(LookupError::Transport("unavailable".into()));
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(Duration::from_secs(3), Duration::from_secs(1), RetryOn::TransientOnly);

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(4_500)).await;
                cancel.cancel();
            })
        };

        let started = tokio::time::Instant::now();
        let outcome = policy.fetch(&lookup, &key, &cancel).await;
        canceller.await.unwrap();

        assert_eq!(outcome, FetchOutcome::Cancelled { attempts: 2 });
        assert_eq!(started.elapsed(), Duration::from_millis(4_500));
    }
}
