//! Middleware implementation for reqwest.

use crate::client::ProxiedClient;
use crate::config::ClientConfig;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;

/// Middleware that sends requests through the rotating proxy pool.
///
/// Requests never reach the rest of the middleware chain: the proxied client
/// performs the final send.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    client: Arc<ProxiedClient>,
}

impl ProxyPoolMiddleware {
    /// Create a new proxy pool middleware with the given configuration and
    /// wait for the pool to be loaded.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let client = ProxiedClient::new(config);
        client
            .ready()
            .await
            .map_err(|e| Error::Middleware(anyhow!(e)))?;

        let size = client.pool().len();
        info!("Proxy pool initialized with {} proxies", size);
        if size == 0 {
            warn!("No proxies available in pool");
        }

        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: Arc<ProxiedClient>) -> Self {
        Self { client }
    }

    /// The proxied client performing the requests.
    pub fn client(&self) -> &Arc<ProxiedClient> {
        &self.client
    }
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        self.client
            .execute(req)
            .await
            .map_err(|e| Error::Middleware(anyhow::Error::new(e)))
    }
}
