//! Core type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::LookupError;

/// Identifier of a tracked item (an asset symbol such as `BTC`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceKey(String);

impl PriceKey {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PriceKey {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

impl From<String> for PriceKey {
    fn from(symbol: String) -> Self {
        Self(symbol)
    }
}

/// One dispatch unit: a single key to look up once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub key: PriceKey,
}

impl WorkItem {
    pub fn new(key: PriceKey) -> Self {
        Self { key }
    }
}

/// Outcome of a resolved lookup, handed from a worker to the aggregator
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: PriceKey,
    pub outcome: Result<f64, LookupError>,
    pub attempts: u32,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn success(key: PriceKey, value: f64, attempts: u32) -> Self {
        Self {
            key,
            outcome: Ok(value),
            attempts,
            observed_at: Utc::now(),
        }
    }

    pub fn failure(key: PriceKey, error: LookupError, attempts: u32) -> Self {
        Self {
            key,
            outcome: Err(error),
            attempts,
            observed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Price record with the delta against the previous observation of the same key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub key: PriceKey,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl PriceRecord {
    /// Build a record, computing the change figure when a usable previous value exists
    pub fn new(key: PriceKey, value: f64, previous_value: Option<f64>, observed_at: DateTime<Utc>) -> Self {
        let percent_change = previous_value.and_then(|prev| percent_change(prev, value));

        Self {
            key,
            value,
            previous_value,
            percent_change,
            observed_at,
        }
    }
}

impl fmt::Display for PriceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2}", self.key, self.value)?;
        if let Some(prev) = self.previous_value {
            write!(f, ", {:.2}", prev)?;
        }
        if let Some(change) = self.percent_change {
            write!(f, ", {:+.2}%", change)?;
        }
        Ok(())
    }
}

/// Lookup that ended in a terminal (non-retried) error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub key: PriceKey,
    pub error: String,
    pub attempts: u32,
    pub observed_at: DateTime<Utc>,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: lookup failed after {} attempt(s): {}", self.key, self.attempts, self.error)
    }
}

/// Entry of the aggregator's output stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Report {
    Price(PriceRecord),
    Failure(FailureRecord),
}

impl Report {
    pub fn key(&self) -> &PriceKey {
        match self {
            Report::Price(r) => &r.key,
            Report::Failure(r) => &r.key,
        }
    }

    pub fn as_price(&self) -> Option<&PriceRecord> {
        match self {
            Report::Price(r) => Some(r),
            Report::Failure(_) => None,
        }
    }
}

/// Signed percent change from `previous` to `current`.
///
/// Returns `None` when `previous` is zero or the result is not finite.
pub fn percent_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }

    let change = (current - previous) / previous * 100.0;
    change.is_finite().then_some(change)
}
