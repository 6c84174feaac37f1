//! Error types for the proxied-reqwest crate.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by a [`Transport`](crate::transport::Transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Readiness failure: the client was given neither static proxies nor a
/// remote proxy list URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("No proxies provided and no proxy URL configured")]
pub struct NoProxySource;

/// Reason a single proxy line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid proxy format: {0}. Must be in format ip:port[:username:password]")]
    InvalidFormat(String),
    #[error("Invalid IP address format: {0}")]
    InvalidHost(String),
    #[error("Invalid port number: {0}")]
    InvalidPort(String),
    #[error("Password is required when username is provided: {0}")]
    MissingPassword(String),
    #[error("Username is required when password is provided: {0}")]
    MissingUsername(String),
}

/// Errors surfaced by the pool and the request executor.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    NoProxySource(#[from] NoProxySource),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("No valid proxies found")]
    NoValidProxies,

    #[error("Proxy file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to fetch proxies from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("No proxy available in pool")]
    EmptyPool,

    #[error("Request failed after {retries} retries: {source}")]
    RetriesExhausted {
        retries: usize,
        #[source]
        source: BoxError,
    },

    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    UncloneableRequest,

    #[error("Invalid request: {0}")]
    InvalidRequest(#[source] reqwest::Error),
}
