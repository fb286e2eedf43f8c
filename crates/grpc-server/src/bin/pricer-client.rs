//! Price polling client
//!
//! Polls the lookup server for the configured keys and logs a price record
//! with the percent change for every observation.

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pricer_grpc_server::settings::{self, DEFAULT_FILE_STEM};
use pricer_grpc_server::shutdown::shutdown_signal;
use pricer_grpc_server::telemetry::init_tracing;
use pricer_grpc_server::{ClientSettings, GrpcPriceLookup};
use pricer_poller::{PricePoller, TracingSink};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Client failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let settings: ClientSettings = settings::load(DEFAULT_FILE_STEM)?;
    let config = settings.poller_config()?;

    info!("Starting pricer client v{} against {}", env!("CARGO_PKG_VERSION"), settings.server_url);

    let lookup = Arc::new(GrpcPriceLookup::connect_lazy(&settings.server_url)?);
    let poller = PricePoller::new(config, lookup)?;

    let keys: Vec<&str> = poller.config().keys.iter().map(|k| k.as_str()).collect();
    info!("Tracking {}", keys.join(", "));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let stats = poller.run(TracingSink, cancel).await?;

    info!(
        "Client stopped after {} cycles: {} records, {} failures, {} abandoned",
        stats.producer.cycles,
        stats.aggregator.records,
        stats.aggregator.failures,
        stats.abandoned()
    );
    Ok(())
}
