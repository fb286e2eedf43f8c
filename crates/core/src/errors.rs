//! Error types

use thiserror::Error;

/// Invalid poller configuration, detected before anything starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("No keys configured: at least one key must be tracked")]
    NoKeys,

    #[error("Duplicate key in tracked set: {0}")]
    DuplicateKey(String),

    #[error("Empty key at position {0}")]
    EmptyKey(usize),

    #[error("Polling interval must be greater than zero")]
    ZeroInterval,

    #[error("Worker count must be at least 1")]
    ZeroWorkers,

    #[error("Retry backoff must be greater than zero")]
    ZeroBackoff,

    #[error("Per-attempt timeout must be greater than zero")]
    ZeroAttemptTimeout,

    #[error("Channel capacity must be at least 1")]
    ZeroChannelCapacity,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Remote price lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Lookup timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Lookup rejected: {0}")]
    Rejected(String),
}

impl LookupError {
    /// Whether another attempt may succeed without any change on the caller side
    pub fn is_transient(&self) -> bool {
        matches!(self, LookupError::Timeout { .. } | LookupError::Transport(_))
    }
}

/// Pipeline task failures reported after shutdown
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{role} task failed: {message}")]
    TaskFailed { role: String, message: String },
}

/// Price store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Market data fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Invalid status {0}")]
    Status(u16),

    #[error("Provider error {code}: {message}")]
    Provider { code: i64, message: String },

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type LookupResult<T> = Result<T, LookupError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type FetchResult<T> = Result<T, FetchError>;
