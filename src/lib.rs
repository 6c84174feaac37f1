//! # proxied-reqwest
//!
//! A rotating SOCKS5 proxy client for reqwest.
//!
//! Every request goes through a randomly chosen proxy from a pool and is retried
//! through a different proxy on failure. The pool is loaded from a static list,
//! a local cache file or a remote proxy list, and refreshed in the background.
//!
//! Logging goes through the `log` facade and is silent until the application
//! installs a logger.

pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod proxy;
pub mod registry;
pub mod transport;
mod utils;

pub use client::{ProxiedClient, RequestOptions};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{BoxError, Error, NoProxySource, ParseError, Result};
pub use middleware::ProxyPoolMiddleware;
pub use pool::ProxyPool;
pub use proxy::ProxyEndpoint;
pub use registry::{get_or_create, instance};
pub use transport::{ReqwestTransport, Timeouts, Transport};
pub use utils::{load_from_file, parse_proxy_list};
