//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::{ConfigError, ConfigResult, PriceKey};

/// Which lookup failures a worker keeps retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    /// Retry timeouts and transport errors; surface everything else as a failure record
    #[default]
    TransientOnly,
    /// Retry every failure until it succeeds or the poller is cancelled
    AnyError,
}

impl RetryOn {
    pub fn name(&self) -> &'static str {
        match self {
            RetryOn::TransientOnly => "transient_only",
            RetryOn::AnyError => "any_error",
        }
    }
}

/// Raw poller settings as read from files and environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub keys: Vec<String>,
    pub interval_ms: u64,
    pub worker_count: usize,
    pub retry_backoff_ms: u64,
    pub attempt_timeout_ms: u64,
    pub retry_on: RetryOn,
    pub channel_capacity: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            keys: vec!["BTC".to_string(), "ETH".to_string(), "USDT".to_string()],
            interval_ms: 3_000,
            worker_count: 3,
            retry_backoff_ms: 3_000,
            attempt_timeout_ms: 1_000,
            retry_on: RetryOn::TransientOnly,
            channel_capacity: 1,
        }
    }
}

impl PollerSettings {
    /// Validate into a [`PollerConfig`]
    pub fn into_config(self) -> ConfigResult<PollerConfig> {
        let config = PollerConfig {
            keys: self.keys.into_iter().map(|k| PriceKey::new(k.trim())).collect(),
            interval: Duration::from_millis(self.interval_ms),
            worker_count: self.worker_count,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            retry_on: self.retry_on,
            channel_capacity: self.channel_capacity,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Validated poller configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Tracked keys, emitted in this order every cycle
    pub keys: Vec<PriceKey>,
    pub interval: Duration,
    pub worker_count: usize,
    pub retry_backoff: Duration,
    pub attempt_timeout: Duration,
    pub retry_on: RetryOn,
    /// Capacity of the request and response channels (1 = hand-off)
    pub channel_capacity: usize,
}

impl PollerConfig {
    pub fn new(keys: impl IntoIterator<Item = impl Into<PriceKey>>) -> Self {
        let defaults = PollerSettings::default();

        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            interval: Duration::from_millis(defaults.interval_ms),
            worker_count: defaults.worker_count,
            retry_backoff: Duration::from_millis(defaults.retry_backoff_ms),
            attempt_timeout: Duration::from_millis(defaults.attempt_timeout_ms),
            retry_on: defaults.retry_on,
            channel_capacity: defaults.channel_capacity,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.keys.is_empty() {
            return Err(ConfigError::NoKeys);
        }

        let mut seen = HashSet::with_capacity(self.keys.len());
        for (i, key) in self.keys.iter().enumerate() {
            if key.as_str().is_empty() {
                return Err(ConfigError::EmptyKey(i));
            }
            if !seen.insert(key) {
                return Err(ConfigError::DuplicateKey(key.to_string()));
            }
        }

        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.retry_backoff.is_zero() {
            return Err(ConfigError::ZeroBackoff);
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::ZeroAttemptTimeout);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }

        Ok(())
    }
}
