//! gRPC-backed price lookup used by the polling client

use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::debug;

use pricer_core::{LookupError, LookupResult, PriceKey};
use pricer_poller::PriceLookup;

use crate::proto::pricer_client::PricerClient;
use crate::proto::PriceRequest;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Looks prices up on a remote `proto.Pricer` service
#[derive(Debug, Clone)]
pub struct GrpcPriceLookup {
    client: PricerClient<Channel>,
}

impl GrpcPriceLookup {
    /// Build a lookup whose channel connects on first use.
    ///
    /// An unreachable server shows up as a transport error per attempt
    /// rather than at startup.
    pub fn connect_lazy(url: &str) -> anyhow::Result<Self> {
        let channel = Endpoint::from_shared(url.to_string())?
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_nodelay(true)
            .connect_lazy();

        Ok(Self::new(channel))
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            client: PricerClient::new(channel),
        }
    }
}

#[async_trait]
impl PriceLookup for GrpcPriceLookup {
    async fn price(&self, key: &PriceKey, timeout: Duration) -> LookupResult<f64> {
        let mut request = tonic::Request::new(PriceRequest {
            token: key.as_str().to_string(),
        });
        request.set_timeout(timeout);

        // Channel clones share one connection.
        let mut client = self.client.clone();
        match client.price(request).await {
            Ok(response) => Ok(response.into_inner().price),
            Err(status) => {
                debug!(key = %key, code = ?status.code(), "Price call failed: {}", status.message());
                Err(status_to_lookup_error(&status, timeout))
            }
        }
    }

    fn name(&self) -> &'static str {
        "grpc"
    }
}

/// Classify a gRPC status into retryable and terminal lookup errors
pub fn status_to_lookup_error(status: &Status, timeout: Duration) -> LookupError {
    match status.code() {
        Code::DeadlineExceeded => LookupError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        Code::Unavailable
        | Code::ResourceExhausted
        | Code::Aborted
        | Code::Internal
        | Code::Unknown
        | Code::Cancelled => LookupError::Transport(describe(status)),
        Code::NotFound => LookupError::UnknownKey(status.message().to_string()),
        _ => LookupError::Rejected(describe(status)),
    }
}

fn describe(status: &Status) -> String {
    format!("{:?}: {}", status.code(), status.message())
}
