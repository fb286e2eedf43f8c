//! Market data fetcher - polls the listings API and writes into the price store

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pricer_core::{FetchError, FetchResult};
use crate::store::PriceStore;

pub const CMC_LISTINGS_URL: &str = "https://pro-api.coinmarketcap.com/v1/cryptocurrency/listings/latest";
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Number of top listings to request
    pub limit: u32,
    /// Quote currency
    pub convert: String,
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            endpoint: CMC_LISTINGS_URL.to_string(),
            api_key: String::new(),
            limit: 3,
            convert: "USD".to_string(),
            interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Polls the market data API on a fixed interval
pub struct MarketFetcher {
    config: FetcherConfig,
    store: Arc<PriceStore>,
    client: reqwest::Client,
}

impl MarketFetcher {
    pub fn new(config: FetcherConfig, store: Arc<PriceStore>) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(Self { config, store, client })
    }

    /// Fetch immediately, then once per interval, until cancelled.
    ///
    /// A failed fetch is logged and retried on the next tick; the store keeps
    /// serving the last known prices meanwhile.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Starting market fetcher: {} every {:?}", self.config.endpoint, self.config.interval);

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.fetch_once().await {
                Ok(count) => info!("Fetcher: stored {} prices", count),
                Err(e) => warn!("Fetcher: fetch failed: {}", e),
            }
        }

        info!("Market fetcher stopped");
    }

    /// One fetch-and-store round
    pub async fn fetch_once(&self) -> FetchResult<usize> {
        let prices = self.fetch_prices().await?;
        self.store_prices(&prices)
    }

    /// Write `prices` into the store and persist it
    pub fn store_prices(&self, prices: &HashMap<String, f64>) -> FetchResult<usize> {
        for (token, price) in prices {
            self.store.put(token, *price);
        }
        self.store.flush()?;

        debug!("Fetcher: received prices ({:?})", prices);
        Ok(prices.len())
    }

    async fn fetch_prices(&self) -> FetchResult<HashMap<String, f64>> {
        let limit = self.config.limit.to_string();

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[("start", "1"), ("limit", limit.as_str()), ("convert", self.config.convert.as_str())])
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| FetchError::Http(e.to_string()))?;
        parse_listings(&body, &self.config.convert)
    }
}

#[derive(Debug, Deserialize)]
struct ListingsResponse {
    status: ListingsStatus,
    #[serde(default)]
    data: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
struct ListingsStatus {
    error_code: i64,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    symbol: String,
    quote: HashMap<String, Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    price: Option<f64>,
}

/// Extract `symbol → price` in the `convert` currency from a listings payload
pub fn parse_listings(body: &str, convert: &str) -> FetchResult<HashMap<String, f64>> {
    let response: ListingsResponse = serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    if response.status.error_code != 0 {
        return Err(FetchError::Provider {
            code: response.status.error_code,
            message: response.status.error_message.unwrap_or_default(),
        });
    }

    let prices = response
        .data
        .into_iter()
        .filter_map(|listing| {
            let price = listing.quote.get(convert).and_then(|q| q.price)?;
            Some((listing.symbol, price))
        })
        .collect();

    Ok(prices)
}
