//! Utility functions for loading, fetching and caching proxy lists.

use crate::error::{Error, Result};
use crate::proxy::ProxyEndpoint;

use log::warn;
use reqwest::Client;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Parse proxy list text into endpoints, one per non-blank line.
///
/// Malformed lines are logged and skipped. Fails only when no line is valid.
pub fn parse_proxy_list(content: &str) -> Result<Vec<ProxyEndpoint>> {
    let proxies: Vec<ProxyEndpoint> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.parse::<ProxyEndpoint>() {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                warn!("Error parsing proxy line: {}", e);
                None
            }
        })
        .collect();

    if proxies.is_empty() {
        return Err(Error::NoValidProxies);
    }

    Ok(proxies)
}

/// Read and parse a proxy list file.
pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Vec<ProxyEndpoint>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| missing_file_or_io(e, path))?;
    parse_proxy_list(&content)
}

/// Age of a file according to its last-modified time.
///
/// A modification time in the future counts as zero age.
pub(crate) async fn file_age(path: &Path) -> Result<Duration> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| missing_file_or_io(e, path))?;
    let modified = metadata.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO))
}

/// Fetch the raw proxy list from a URL and validate it.
///
/// Returns the body as received together with the parsed endpoints.
pub(crate) async fn fetch_proxy_list(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<(String, Vec<ProxyEndpoint>)> {
    let fetch_error = |source| Error::Fetch {
        url: url.to_string(),
        source,
    };

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(fetch_error)?;
    let content = response.text().await.map_err(fetch_error)?;
    let proxies = parse_proxy_list(&content)?;
    Ok((content, proxies))
}

/// Write the proxy list to the cache file, creating parent directories.
pub(crate) async fn save_proxy_list(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

fn missing_file_or_io(err: std::io::Error, path: &Path) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::MissingFile(path.to_path_buf())
    } else {
        Error::Io(err)
    }
}
