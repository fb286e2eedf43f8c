//! Layered settings for the server and client binaries
//!
//! Sources, lowest precedence first: struct defaults, an optional
//! `pricer.toml`, then `PRICER_` environment variables. Nested fields use a
//! double underscore (`PRICER_POLLER__WORKER_COUNT=4`), lists are comma
//! separated (`PRICER_POLLER__KEYS=BTC,ETH`).

use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use pricer_core::{ConfigError, ConfigResult, PollerConfig, PollerSettings};

use crate::fetcher::{FetcherConfig, CMC_LISTINGS_URL};
use crate::server::{GrpcServer, GrpcServerBuilder};
use crate::service::PricerServiceImpl;

pub const DEFAULT_FILE_STEM: &str = "pricer";
const ENV_PREFIX: &str = "PRICER";

/// Polling client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_url: String,
    pub poller: PollerSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:50051".to_string(),
            poller: PollerSettings::default(),
        }
    }
}

impl ClientSettings {
    pub fn poller_config(&self) -> ConfigResult<PollerConfig> {
        self.poller.clone().into_config()
    }
}

/// Lookup server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// JSON snapshot of the price store; in-memory only when unset
    pub store_path: Option<String>,
    /// Concurrent requests per connection
    pub concurrency_limit: usize,
    pub keep_alive_interval_secs: u64,
    pub keep_alive_timeout_secs: u64,
    pub accept_http1: bool,
    pub fetcher: FetcherSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
            store_path: None,
            concurrency_limit: 256,
            keep_alive_interval_secs: 60,
            keep_alive_timeout_secs: 20,
            accept_http1: true,
            fetcher: FetcherSettings::default(),
        }
    }
}

impl ServerSettings {
    /// Build the gRPC server for `service` from these settings
    pub fn build_server(&self, service: PricerServiceImpl) -> ConfigResult<GrpcServer> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Invalid("concurrency_limit must be at least 1".into()));
        }

        let server = GrpcServerBuilder::new()
            .host(self.host.as_str())
            .port(self.port)
            .concurrency_limit(self.concurrency_limit)
            .keep_alive_interval(Duration::from_secs(self.keep_alive_interval_secs))
            .keep_alive_timeout(Duration::from_secs(self.keep_alive_timeout_secs))
            .accept_http1(self.accept_http1)
            .service(service)
            .build();

        Ok(server)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    pub endpoint: String,
    pub api_key: String,
    pub limit: u32,
    pub convert: String,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            endpoint: CMC_LISTINGS_URL.to_string(),
            api_key: String::new(),
            limit: 3,
            convert: "USD".to_string(),
            interval_secs: 60,
            request_timeout_secs: 10,
        }
    }
}

impl FetcherSettings {
    pub fn fetcher_config(&self) -> ConfigResult<FetcherConfig> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("fetcher.interval_secs must be greater than zero".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.limit == 0 {
            return Err(ConfigError::Invalid("fetcher.limit must be at least 1".into()));
        }

        Ok(FetcherConfig {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            limit: self.limit,
            convert: self.convert.clone(),
            interval: Duration::from_secs(self.interval_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

/// Load settings from `<file_stem>.{toml,json,yaml}` (if present) and the environment
pub fn load<T: DeserializeOwned>(file_stem: &str) -> anyhow::Result<T> {
    load_with(file_stem, environment())
}

fn load_with<T: DeserializeOwned>(file_stem: &str, env: Environment) -> anyhow::Result<T> {
    let settings = Config::builder()
        .add_source(File::with_name(file_stem).required(false))
        .add_source(env)
        .build()?
        .try_deserialize()?;

    Ok(settings)
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("poller.keys")
        .try_parsing(true)
}
