//! Configuration for the proxied client.

use crate::proxy::ProxyEndpoint;

use std::path::PathBuf;
use std::time::Duration;

/// Default number of attempts per logical request.
pub const DEFAULT_RETRIES: usize = 5;

/// Default interval between scheduled pool refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Default per-attempt connect timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default timeout for downloading the remote proxy list.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the cache directory created under the working directory.
pub const DEFAULT_CONFIG_DIR: &str = ".proxied-reqwest";

/// Configuration for the proxied client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pre-parsed proxies available before any refresh.
    pub proxies: Vec<ProxyEndpoint>,
    /// Total number of attempts per request, at least one.
    pub retries: usize,
    /// Remote URL serving a proxy list.
    pub proxy_url: Option<String>,
    /// Interval between scheduled refreshes.
    pub refresh_interval: Duration,
    /// Per-attempt connect timeout. The overall request timeout is never below 30 seconds.
    pub timeout: Duration,
    /// Timeout for downloading the remote proxy list.
    pub fetch_timeout: Duration,
    /// Directory holding the `proxies.txt` cache file.
    pub config_dir: PathBuf,
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Path of the proxy list cache file.
    pub fn cache_file(&self) -> PathBuf {
        self.config_dir.join("proxies.txt")
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigBuilder::new().build()
    }
}

/// Builder for `ClientConfig`.
pub struct ClientConfigBuilder {
    proxies: Vec<ProxyEndpoint>,
    retries: Option<usize>,
    proxy_url: Option<String>,
    refresh_interval: Option<Duration>,
    timeout: Option<Duration>,
    fetch_timeout: Option<Duration>,
    config_dir: Option<PathBuf>,
}

impl ClientConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            proxies: Vec::new(),
            retries: None,
            proxy_url: None,
            refresh_interval: None,
            timeout: None,
            fetch_timeout: None,
            config_dir: None,
        }
    }

    /// Set the static proxy list.
    pub fn proxies(mut self, proxies: Vec<ProxyEndpoint>) -> Self {
        self.proxies = proxies;
        self
    }

    /// Set the total number of attempts per request. Zero is raised to one.
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the remote URL to fetch the proxy list from.
    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    /// Set the interval between scheduled refreshes.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Set the per-attempt connect timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the timeout for downloading the remote proxy list.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Set the cache directory.
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        ClientConfig {
            proxies: self.proxies,
            retries: self.retries.unwrap_or(DEFAULT_RETRIES).max(1),
            proxy_url: self.proxy_url,
            refresh_interval: self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            fetch_timeout: self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            config_dir: self.config_dir.unwrap_or_else(|| {
                std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_CONFIG_DIR)
            }),
        }
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
