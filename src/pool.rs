//! Core proxy pool implementation.

use crate::config::ClientConfig;
use crate::error::{Error, NoProxySource, Result};
use crate::proxy::ProxyEndpoint;
use crate::utils;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time;

/// Cache files older than this are refetched from the remote source.
pub const CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Shared completion signal for the most recent pool load.
pub type Readiness = Shared<BoxFuture<'static, std::result::Result<(), NoProxySource>>>;

/// A pool of SOCKS5 proxies, refreshed from a cache file or remote list.
///
/// Only the pool itself swaps the proxy list, from the cache file or the
/// remote source:
///
/// ```compile_fail
/// use proxied_reqwest::{ClientConfig, ProxyPool};
///
/// let pool = ProxyPool::new(&ClientConfig::default());
/// pool.replace(Vec::new());
/// ```
pub struct ProxyPool {
    /// Current proxies. Replaced wholesale, never edited in place.
    proxies: RwLock<Arc<Vec<ProxyEndpoint>>>,
    /// Remote proxy list URL.
    proxy_url: Option<String>,
    config_dir: PathBuf,
    cache_file: PathBuf,
    refresh_interval: Duration,
    /// Client used to download the proxy list. Never proxied.
    http: reqwest::Client,
    fetch_timeout: Duration,
    /// The in-flight (or last completed) load.
    ready: Mutex<Readiness>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl ProxyPool {
    /// Create a new proxy pool with the given configuration.
    ///
    /// With a remote URL this starts the background refresh task on the
    /// current Tokio runtime. Outside a runtime no task is started and the
    /// first load runs when [`ready`](Self::ready) is awaited.
    pub fn new(config: &ClientConfig) -> Arc<Self> {
        let ready = if config.proxy_url.is_some() || !config.proxies.is_empty() {
            future::ready(Ok(())).boxed().shared()
        } else {
            future::ready(Err(NoProxySource)).boxed().shared()
        };

        let pool = Arc::new(Self {
            proxies: RwLock::new(Arc::new(config.proxies.clone())),
            proxy_url: config.proxy_url.clone(),
            config_dir: config.config_dir.clone(),
            cache_file: config.cache_file(),
            refresh_interval: config.refresh_interval,
            http: reqwest::Client::new(),
            fetch_timeout: config.fetch_timeout,
            ready: Mutex::new(ready),
            refresh_task: Mutex::new(None),
        });

        if pool.proxy_url.is_some() {
            let initial = pool.schedule_refresh(true);

            let Ok(runtime) = Handle::try_current() else {
                error!("No Tokio runtime available, background proxy refresh disabled");
                return pool;
            };

            // Start background refresh task
            let pool_clone = Arc::clone(&pool);
            let task = runtime.spawn(async move {
                let _ = initial.await;
                info!("Initial proxy pool size: {}", pool_clone.len());

                loop {
                    time::sleep(pool_clone.refresh_interval).await;
                    info!("Refreshing proxies...");
                    let _ = pool_clone.schedule_refresh(false).await;
                    info!("Proxies refreshed, pool size: {}", pool_clone.len());
                }
            });
            *pool.refresh_task.lock() = Some(task);
        } else if pool.is_empty() {
            warn!("No proxies provided and no proxy URL configured");
        }

        pool
    }

    /// Start a refresh and publish it as the current readiness signal.
    fn schedule_refresh(self: &Arc<Self>, prepare: bool) -> Readiness {
        let pool = Arc::clone(self);
        let refresh = async move {
            if prepare {
                pool.prepare_cache_dir().await;
            }
            pool.refresh().await;
            Ok::<_, NoProxySource>(())
        }
        .boxed()
        .shared();

        *self.ready.lock() = refresh.clone();
        refresh
    }

    /// Wait until the pool has been loaded at least once.
    ///
    /// During a scheduled refresh this waits for that refresh to finish.
    pub async fn ready(&self) -> std::result::Result<(), NoProxySource> {
        let ready = self.ready.lock().clone();
        ready.await
    }

    /// Create the cache directory if it does not exist yet.
    pub async fn prepare_cache_dir(&self) {
        match tokio::fs::create_dir_all(&self.config_dir).await {
            Ok(()) => debug!("Cache directory ready at {}", self.config_dir.display()),
            Err(e) => error!(
                "Error creating cache directory {}: {}",
                self.config_dir.display(),
                e
            ),
        }
    }

    /// Reload the pool from the cache file, or from the remote source when the
    /// cache is missing or older than [`CACHE_MAX_AGE`].
    ///
    /// Failures are logged and leave the current pool untouched.
    pub async fn refresh(&self) {
        match utils::file_age(&self.cache_file).await {
            Ok(age) if age < CACHE_MAX_AGE => match utils::load_from_file(&self.cache_file).await {
                Ok(proxies) => {
                    debug!("Loaded {} proxies from cache", proxies.len());
                    self.replace(proxies);
                }
                Err(e) => error!("Error loading proxies: {}", e),
            },
            Ok(_) => {
                info!("Proxy file is older than a day. Fetching new proxies...");
                self.fetch_and_save().await;
            }
            Err(Error::MissingFile(_)) => {
                info!("Proxy file not found. Fetching new proxies...");
                self.fetch_and_save().await;
            }
            Err(e) => error!("Error loading proxies: {}", e),
        }
    }

    async fn fetch_and_save(&self) {
        let Some(url) = self.proxy_url.as_deref() else {
            error!("Error fetching proxies: proxy URL not configured");
            return;
        };

        let result = async {
            let (content, proxies) = utils::fetch_proxy_list(&self.http, url, self.fetch_timeout).await?;
            utils::save_proxy_list(&self.cache_file, &content).await?;
            Ok::<_, Error>(proxies)
        }
        .await;

        match result {
            Ok(proxies) => {
                info!("Fetched {} proxies from {}", proxies.len(), url);
                self.replace(proxies);
            }
            Err(e) => error!("Error fetching proxies: {}", e),
        }
    }

    /// Swap in a new proxy list.
    pub(crate) fn replace(&self, proxies: Vec<ProxyEndpoint>) {
        *self.proxies.write() = Arc::new(proxies);
    }

    /// Snapshot of the current proxies.
    pub fn proxies(&self) -> Arc<Vec<ProxyEndpoint>> {
        self.proxies.read().clone()
    }

    /// Pick a proxy uniformly at random.
    pub fn choose(&self) -> Result<ProxyEndpoint> {
        let proxies = self.proxies();
        if proxies.is_empty() {
            return Err(Error::EmptyPool);
        }

        let idx = rand::rng().random_range(0..proxies.len());
        Ok(proxies[idx].clone())
    }

    /// Number of proxies currently in the pool.
    pub fn len(&self) -> usize {
        self.proxies.read().len()
    }

    /// Whether the pool currently holds no proxies.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the proxy list cache file.
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Whether the background refresh task is running.
    pub fn is_refreshing(&self) -> bool {
        self.refresh_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}
