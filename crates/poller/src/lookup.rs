//! Remote price lookup boundary

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use pricer_core::{LookupResult, PriceKey};

/// A request/response price source, one call per attempt.
///
/// `timeout` is the caller's deadline for this call. Implementations should
/// forward it to the remote side when the transport supports deadlines; the
/// retry policy enforces it locally either way.
#[async_trait]
pub trait PriceLookup: Send + Sync + 'static {
    async fn price(&self, key: &PriceKey, timeout: Duration) -> LookupResult<f64>;

    /// Short name used in logs
    fn name(&self) -> &'static str {
        "lookup"
    }
}

#[async_trait]
impl<T: PriceLookup + ?Sized> PriceLookup for Arc<T> {
    async fn price(&self, key: &PriceKey, timeout: Duration) -> LookupResult<f64> {
        (**self).price(key, timeout).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
