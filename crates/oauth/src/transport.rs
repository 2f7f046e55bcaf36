//! The HTTP seam every signer and flow delegates to.

use std::sync::Arc;

use {
    async_trait::async_trait,
    reqwest::{Request, Response},
};

use crate::error::Result;

/// Executes a single HTTP transaction.
///
/// Timeouts and cancellation belong to the implementation, not to callers.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Transport backed by a [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        Ok(self.client.execute(request).await?)
    }
}

/// The transport used when none is supplied.
pub fn default_transport() -> Arc<dyn HttpTransport> {
    Arc::new(ReqwestTransport::default())
}
