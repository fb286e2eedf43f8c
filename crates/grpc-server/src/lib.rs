//! gRPC price lookup service and polling client
//!
//! Server side: market fetcher writing into the price store, served over
//! `proto.Pricer/Price`. Client side: the gRPC-backed [`PriceLookup`] used by
//! the poller pipeline.
//!
//! [`PriceLookup`]: pricer_poller::PriceLookup

pub mod fetcher;
pub mod lookup;
pub mod server;
pub mod service;
pub mod settings;
pub mod shutdown;
pub mod store;
pub mod telemetry;

// Re-export proto types
pub mod proto {
    include!("generated/proto.rs");
}

pub use fetcher::{FetcherConfig, MarketFetcher};
pub use lookup::GrpcPriceLookup;
pub use server::{GrpcServer, GrpcServerBuilder, GrpcServerConfig};
pub use service::PricerServiceImpl;
pub use settings::{ClientSettings, ServerSettings};
pub use store::PriceStore;
