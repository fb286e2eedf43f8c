//! gRPC server configuration and startup

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tracing::info;

use crate::proto::pricer_server::PricerServer;
use crate::service::PricerServiceImpl;

/// Server configuration
#[derive(Debug, Clone)]
pub struct GrpcServerConfig {
    pub host: String,
    pub port: u16,
    pub concurrency_limit: usize,
    pub keep_alive_interval: Duration,
    pub keep_alive_timeout: Duration,
    pub accept_http1: bool,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
            concurrency_limit: 256,
            keep_alive_interval: Duration::from_secs(60),
            keep_alive_timeout: Duration::from_secs(20),
            accept_http1: true, // For grpc-web compatibility
        }
    }
}

/// gRPC server wrapper
pub struct GrpcServer {
    config: GrpcServerConfig,
    service: Arc<PricerServiceImpl>,
}

impl GrpcServer {
    pub fn with_service(config: GrpcServerConfig, service: PricerServiceImpl) -> Self {
        Self {
            config,
            service: Arc::new(service),
        }
    }

    pub fn config(&self) -> &GrpcServerConfig {
        &self.config
    }

    /// Serve on the configured address until `shutdown` resolves
    pub async fn start_with_shutdown<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr: SocketAddr = self.address().parse()?;

        info!("Starting gRPC server on {} (with graceful shutdown)", addr);

        self.router()
            .serve_with_shutdown(addr, async move {
                shutdown.await;
                info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_listener<F>(&self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!("Starting gRPC server on {}", listener.local_addr()?);

        self.router()
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await?;

        Ok(())
    }

    /// Get server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn router(&self) -> Router {
        Server::builder()
            .accept_http1(self.config.accept_http1)
            .concurrency_limit_per_connection(self.config.concurrency_limit)
            .tcp_keepalive(Some(self.config.keep_alive_interval))
            .http2_keepalive_interval(Some(self.config.keep_alive_interval))
            .http2_keepalive_timeout(Some(self.config.keep_alive_timeout))
            .add_service(PricerServer::from_arc(Arc::clone(&self.service)))
    }
}

/// Builder for server configuration
pub struct GrpcServerBuilder {
    config: GrpcServerConfig,
    service: Option<PricerServiceImpl>,
}

impl GrpcServerBuilder {
    pub fn new() -> Self {
        Self {
            config: GrpcServerConfig::default(),
            service: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.config.concurrency_limit = limit;
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.config.keep_alive_interval = interval;
        self
    }

    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    pub fn accept_http1(mut self, accept: bool) -> Self {
        self.config.accept_http1 = accept;
        self
    }

    pub fn service(mut self, service: PricerServiceImpl) -> Self {
        self.service = Some(service);
        self
    }

    pub fn build(self) -> GrpcServer {
        GrpcServer::with_service(self.config, self.service.unwrap_or_default())
    }
}

impl Default for GrpcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
