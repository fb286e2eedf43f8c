//! Price store backing the lookup service
//!
//! Uses DashMap for concurrent reads from request handlers while the
//! fetcher writes. Optionally persisted as a JSON snapshot.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use pricer_core::StoreResult;

/// Stored price entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrice {
    pub price: f64,
    pub updated_at: DateTime<Utc>,
}

/// Token → latest price
#[derive(Debug)]
pub struct PriceStore {
    prices: DashMap<String, StoredPrice>,
    path: Option<PathBuf>,

    /// Stats
    write_count: AtomicU64,
    last_write: RwLock<Option<Instant>>,
}

impl PriceStore {
    /// Store without persistence
    pub fn in_memory() -> Self {
        Self {
            prices: DashMap::new(),
            path: None,
            write_count: AtomicU64::new(0),
            last_write: RwLock::new(None),
        }
    }

    /// Open a store persisted at `path`, loading the existing snapshot if any
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self::in_memory();

        if path.exists() {
            let data = std::fs::read(&path)?;
            let snapshot: BTreeMap<String, StoredPrice> = serde_json::from_slice(&data)?;
            info!("Loaded {} prices from {}", snapshot.len(), path.display());
            store.prices.extend(snapshot);
        } else {
            info!("No snapshot at {}, starting empty", path.display());
        }

        store.path = Some(path);
        Ok(store)
    }

    /// Write a price
    pub fn put(&self, token: &str, price: f64) {
        let entry = StoredPrice {
            price,
            updated_at: Utc::now(),
        };

        self.prices.insert(token.to_string(), entry);
        self.write_count.fetch_add(1, Ordering::Relaxed);
        *self.last_write.write() = Some(Instant::now());
    }

    /// Read a price
    pub fn get(&self, token: &str) -> Option<StoredPrice> {
        self.prices.get(token).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Persist a snapshot; no-op for in-memory stores.
    ///
    /// Writes to a sibling temp file first so a crash never leaves a torn snapshot.
    pub fn flush(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot: BTreeMap<String, StoredPrice> = self
            .prices
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let data = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;

        debug!("Flushed {} prices to {}", snapshot.len(), path.display());
        Ok(())
    }

    /// Stats
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            price_count: self.prices.len(),
            write_count: self.write_count.load(Ordering::Relaxed),
            last_write_age: self.last_write.read().map(|t| t.elapsed()),
        }
    }
}

impl Default for PriceStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Statistics about the price store
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub price_count: usize,
    pub write_count: u64,
    pub last_write_age: Option<Duration>,
}
