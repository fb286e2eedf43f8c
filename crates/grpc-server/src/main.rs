//! Price lookup server
//!
//! Fetches market prices into the store and serves them over gRPC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pricer_grpc_server::settings::{self, DEFAULT_FILE_STEM};
use pricer_grpc_server::shutdown::shutdown_signal;
use pricer_grpc_server::telemetry::init_tracing;
use pricer_grpc_server::{MarketFetcher, PriceStore, PricerServiceImpl, ServerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting pricer server v{}", env!("CARGO_PKG_VERSION"));

    let settings: ServerSettings = settings::load(DEFAULT_FILE_STEM)?;
    if settings.fetcher.api_key.is_empty() {
        warn!("PRICER_FETCHER__API_KEY is not set; market fetches will be rejected");
    }

    let store = Arc::new(match &settings.store_path {
        Some(path) => PriceStore::open(path)?,
        None => PriceStore::in_memory(),
    });
    info!("Price store ready with {} prices", store.len());

    let server = settings.build_server(PricerServiceImpl::new(Arc::clone(&store)))?;
    let config = server.config();
    let fetcher_config = settings.fetcher.fetcher_config()?;

    // Start background fetcher
    let cancel = CancellationToken::new();
    let fetcher = MarketFetcher::new(fetcher_config, Arc::clone(&store))?;
    let fetcher_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { fetcher.run(cancel).await })
    };

    info!(
        "gRPC server listening on {} (concurrency {}, keep-alive {:?}/{:?})",
        server.address(),
        config.concurrency_limit,
        config.keep_alive_interval,
        config.keep_alive_timeout
    );
    info!("Press Ctrl+C to shutdown");

    let served = server.start_with_shutdown(shutdown_signal()).await;

    cancel.cancel();
    if let Err(e) = fetcher_handle.await {
        error!("Fetcher task failed: {}", e);
    }

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e);
    }

    let stats = store.stats();
    info!(
        "Server shutdown complete: {} prices, {} writes",
        stats.price_count, stats.write_count
    );
    Ok(())
}
