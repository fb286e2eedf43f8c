//! Fakes shared by the pipeline tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pricer_core::{LookupError, LookupResult, PriceKey};
use crate::lookup::PriceLookup;
use crate::retry::Clock;

/// One scripted lookup response
#[derive(Debug, Clone)]
pub enum Scripted {
    Value(f64),
    Fail(LookupError),
    /// Never resolves; the attempt timeout has to cut it off
    Hang,
}

/// Lookup that replays per-key scripts.
///
/// Once a key's script is exhausted the last value is repeated; keys without
/// a script answer with the fallback error.
#[derive(Debug)]
pub struct ScriptedLookup {
    scripts: Mutex<HashMap<PriceKey, VecDeque<Scripted>>>,
    last_values: Mutex<HashMap<PriceKey, f64>>,
    calls: Mutex<HashMap<PriceKey, usize>>,
    fallback: LookupError,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            last_values: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            fallback: LookupError::UnknownKey("unscripted".into()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn script(self, key: &str, steps: impl IntoIterator<Item = Scripted>) -> Self {
        self.scripts
            .lock()
            .insert(PriceKey::new(key), steps.into_iter().collect());
        self
    }

    /// Answer every unscripted call with `error`
    pub fn failing_with(mut self, error: LookupError) -> Self {
        self.fallback = error;
        self
    }

    pub fn calls(&self, key: &PriceKey) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, key: &PriceKey) -> Scripted {
        *self.calls.lock().entry(key.clone()).or_insert(0) += 1;

        if let Some(step) = self.scripts.lock().get_mut(key).and_then(|s| s.pop_front()) {
            return step;
        }

        match self.last_values.lock().get(key) {
            Some(value) => Scripted::Value(*value),
            None => Scripted::Fail(self.fallback.clone()),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PriceLookup for ScriptedLookup {
    async fn price(&self, key: &PriceKey, _timeout: Duration) -> LookupResult<f64> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        tokio::task::yield_now().await;

        match self.next_step(key) {
            Scripted::Value(value) => {
                self.last_values.lock().insert(key.clone(), value);
                Ok(value)
            }
            Scripted::Fail(error) => Err(error),
            Scripted::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Clock that records requested backoffs and returns immediately
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        tokio::task::yield_now().await;
    }
}
