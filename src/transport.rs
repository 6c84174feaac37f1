//! Transport used to send a single request through a chosen proxy.

use crate::error::BoxError;
use crate::proxy::ProxyEndpoint;

use async_trait::async_trait;
use std::time::Duration;

/// The overall request timeout is never shorter than this.
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeouts applied to one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Timeout for establishing the proxied connection.
    pub connect: Duration,
    /// Timeout for the whole request.
    pub request: Duration,
}

impl Timeouts {
    /// Derive attempt timeouts from the configured timeout.
    pub fn from_configured(timeout: Duration) -> Self {
        Self {
            connect: timeout,
            request: timeout.max(MIN_REQUEST_TIMEOUT),
        }
    }
}

/// Sends one HTTP request through one proxy.
///
/// Only transport-level failures are errors; HTTP status codes are left to
/// the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        proxy: &ProxyEndpoint,
        request: reqwest::Request,
        timeouts: Timeouts,
    ) -> Result<reqwest::Response, BoxError>;
}

/// Transport backed by a `reqwest::Client` built per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        proxy: &ProxyEndpoint,
        request: reqwest::Request,
        timeouts: Timeouts,
    ) -> Result<reqwest::Response, BoxError> {
        // Build a new client with the proxy
        let client = reqwest::Client::builder()
            .proxy(proxy.to_reqwest_proxy()?)
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()?;

        Ok(client.execute(request).await?)
    }
}
