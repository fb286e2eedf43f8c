//! gRPC service implementation

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use crate::proto::pricer_server::Pricer;
use crate::proto::{PriceReply, PriceRequest};
use crate::store::PriceStore;

/// Answers price requests from the store
#[derive(Debug, Clone)]
pub struct PricerServiceImpl {
    store: Arc<PriceStore>,
}

impl PricerServiceImpl {
    pub fn new(store: Arc<PriceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }
}

impl Default for PricerServiceImpl {
    fn default() -> Self {
        Self::new(Arc::new(PriceStore::in_memory()))
    }
}

#[tonic::async_trait]
impl Pricer for PricerServiceImpl {
    async fn price(&self, request: Request<PriceRequest>) -> Result<Response<PriceReply>, Status> {
        let token = request.into_inner().token;

        if token.is_empty() {
            return Err(Status::invalid_argument("Token must not be empty"));
        }

        let Some(stored) = self.store.get(&token) else {
            return Err(Status::not_found(format!("Price not found for {}", token)));
        };

        debug!("Price({}) = {}", token, stored.price);
        Ok(Response::new(PriceReply { price: stored.price }))
    }
}
