//! Request executor rotating through the proxy pool.

use crate::config::ClientConfig;
use crate::error::{Error, NoProxySource, Result};
use crate::pool::ProxyPool;
use crate::transport::{ReqwestTransport, Timeouts, Transport};
use crate::utils;

use http::HeaderMap;
use log::{debug, error, info, warn};
use reqwest::{Body, IntoUrl, Method, Request, Response};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Extra request parameters shared by all verb helpers.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Headers added to the request.
    pub headers: HeaderMap,
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    /// Options without extra headers or query parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, replacing any previous value for the same name.
    pub fn header(mut self, name: http::header::HeaderName, value: http::header::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// HTTP client sending every request through a randomly chosen SOCKS5 proxy.
pub struct ProxiedClient {
    pool: Arc<ProxyPool>,
    transport: Arc<dyn Transport>,
    retries: usize,
    /// Per-attempt connect timeout in milliseconds.
    timeout_ms: AtomicU64,
}

impl ProxiedClient {
    /// Create a new client with the given configuration.
    ///
    /// Scheduled refreshes only run when called from within a Tokio runtime.
    pub fn new(config: ClientConfig) -> Arc<Self> {
        Self::with_transport(config, Arc::new(ReqwestTransport))
    }

    /// Create a new client sending requests through a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let pool = ProxyPool::new(&config);
        info!(
            "Proxied client created with {} proxies, {} retries",
            pool.len(),
            config.retries
        );

        Arc::new(Self {
            pool,
            transport,
            retries: config.retries.max(1),
            timeout_ms: AtomicU64::new(duration_to_millis(config.timeout)),
        })
    }

    /// Create a client from a proxy list file.
    ///
    /// The file's proxies replace any in `config`.
    pub async fn from_file(path: impl AsRef<Path>, config: ClientConfig) -> Result<Arc<Self>> {
        let proxies = utils::load_from_file(path).await?;
        Ok(Self::new(ClientConfig { proxies, ..config }))
    }

    /// Wait until the proxy pool has been loaded.
    pub async fn ready(&self) -> std::result::Result<(), NoProxySource> {
        self.pool.ready().await
    }

    /// The proxy pool backing this client.
    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Total number of attempts per request.
    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Current per-attempt connect timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Change the per-attempt connect timeout for subsequent attempts.
    pub fn set_timeout(&self, timeout: Duration) -> &Self {
        self.timeout_ms
            .store(duration_to_millis(timeout), Ordering::Relaxed);
        self
    }

    /// Execute a request, retrying through a different proxy on failure.
    ///
    /// At most `retries` attempts are made in total.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.pool.ready().await?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let proxy = self.pool.choose()?;
            let proxied_request = request.try_clone().ok_or(Error::UncloneableRequest)?;
            let timeouts = Timeouts::from_configured(self.timeout());

            debug!("Using proxy: {} (attempt {}/{})", proxy, attempt, self.retries);
            match self.transport.send(&proxy, proxied_request, timeouts).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt >= self.retries => {
                    error!("Request failed after {} retries: {}", self.retries, err);
                    return Err(Error::RetriesExhausted {
                        retries: self.retries,
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(
                        "Request failed with proxy {}, retrying... ({}/{}): {}",
                        proxy, attempt, self.retries, err
                    );
                }
            }
        }
    }

    /// Build and execute a request.
    pub async fn request<U: IntoUrl>(
        &self,
        method: Method,
        url: U,
        body: Option<Body>,
        options: RequestOptions,
    ) -> Result<Response> {
        let mut url = url.into_url().map_err(Error::InvalidRequest)?;
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&options.query);
        }

        let mut request = Request::new(method, url);
        *request.headers_mut() = options.headers;
        *request.body_mut() = body;
        self.execute(request).await
    }

    /// Send a `GET` request.
    pub async fn get<U: IntoUrl>(&self, url: U, options: RequestOptions) -> Result<Response> {
        self.request(Method::GET, url, None, options).await
    }

    /// Send a `POST` request with a body.
    pub async fn post<U: IntoUrl, B: Into<Body>>(&self, url: U, body: B, options: RequestOptions) -> Result<Response> {
        self.request(Method::POST, url, Some(body.into()), options).await
    }

    /// Send a `PUT` request with a body.
    pub async fn put<U: IntoUrl, B: Into<Body>>(&self, url: U, body: B, options: RequestOptions) -> Result<Response> {
        self.request(Method::PUT, url, Some(body.into()), options).await
    }

    /// Send a `DELETE` request.
    pub async fn delete<U: IntoUrl>(&self, url: U, options: RequestOptions) -> Result<Response> {
        self.request(Method::DELETE, url, None, options).await
    }

    /// Send a `PATCH` request with a body.
    pub async fn patch<U: IntoUrl, B: Into<Body>>(&self, url: U, body: B, options: RequestOptions) -> Result<Response> {
        self.request(Method::PATCH, url, Some(body.into()), options).await
    }

    /// Send a `HEAD` request.
    pub async fn head<U: IntoUrl>(&self, url: U, options: RequestOptions) -> Result<Response> {
        self.request(Method::HEAD, url, None, options).await
    }

    /// Send an `OPTIONS` request.
    pub async fn options<U: IntoUrl>(&self, url: U, options: RequestOptions) -> Result<Response> {
        self.request(Method::OPTIONS, url, None, options).await
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::proxy::ProxyEndpoint;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use tempfile::tempdir;
    use tokio_test::assert_ok;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records every attempt and fails until the configured attempt.
    pub(crate) struct ScriptedTransport {
        succeed_on: Option<usize>,
        pub(crate) attempts: Mutex<Vec<(ProxyEndpoint, Request, Timeouts)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn failing() -> Arc<Self> {
            Arc::new(Self {
                succeed_on: None,
                attempts: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn succeeding_on(attempt: usize) -> Arc<Self> {
            Arc::new(Self {
                succeed_on: Some(attempt),
                attempts: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn attempt_count(&self) -> usize {
            self.attempts.lock().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            proxy: &ProxyEndpoint,
            request: Request,
            timeouts: Timeouts,
        ) -> std::result::Result<Response, BoxError> {
            let attempt = {
                let mut attempts = self.attempts.lock();
                attempts.push((proxy.clone(), request, timeouts));
                attempts.len()
            };

            match self.succeed_on {
                Some(n) if attempt >= n => Ok(http::Response::builder()
                    .status(200)
                    .body(format!("attempt {attempt}"))
                    .unwrap()
                    .into()),
                _ => Err(format!("connection refused on attempt {attempt}").into()),
            }
        }
    }

    fn proxies() -> Vec<ProxyEndpoint> {
        vec![
            ProxyEndpoint::new("1.1.1.1", 1080),
            ProxyEndpoint::new("2.2.2.2", 1080).with_credentials("u", "p"),
            ProxyEndpoint::new("3.3.3.3", 1080),
        ]
    }

    fn client(retries: usize, transport: Arc<ScriptedTransport>) -> Arc<ProxiedClient> {
        let config = ClientConfig::builder()
            .proxies(proxies())
            .retries(retries)
            .build();
        ProxiedClient::with_transport(config, transport)
    }

    #[tokio::test]
    async fn should_make_exactly_retries_attempts() {
        let transport = ScriptedTransport::failing();
        let client = client(3, transport.clone());

        let err = client.get("http://example.com/", RequestOptions::new()).await.unwrap_err();
        match &err {
            Error::RetriesExhausted { retries, source } => {
                assert_eq!(*retries, 3);
                assert_eq!(source.to_string(), "connection refused on attempt 3");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "Request failed after 3 retries: connection refused on attempt 3");
        assert_eq!(transport.attempt_count(), 3);

        let all = proxies();
        for (proxy, _, _) in transport.attempts.lock().iter() {
            assert!(all.contains(proxy));
        }
    }

    #[tokio::test]
    async fn should_choose_a_new_proxy_on_every_attempt() {
        let transport = ScriptedTransport::failing();
        let client = client(40, transport.clone());

        assert!(client.get("http://example.com/", RequestOptions::new()).await.is_err());
        assert_eq!(transport.attempt_count(), 40);

        // Three proxies drawn 40 times: the odds of a single repeated one are 3^-39.
        let tried: HashSet<ProxyEndpoint> = transport
            .attempts
            .lock()
            .iter()
            .map(|(proxy, _, _)| proxy.clone())
            .collect();
        assert!(tried.len() > 1);
    }

    #[tokio::test]
    async fn should_make_single_attempt_with_one_retry() {
        let transport = ScriptedTransport::failing();
        let client = client(1, transport.clone());

        let err = client.get("http://example.com/", RequestOptions::new()).await.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { retries: 1, .. }));
        assert_eq!(transport.attempt_count(), 1);
    }

    #[tokio::test]
    async fn should_stop_after_first_success() {
        let transport = ScriptedTransport::succeeding_on(3);
        let client = client(5, transport.clone());

        let response = client.get("http://example.com/", RequestOptions::new()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "attempt 3");
        assert_eq!(transport.attempt_count(), 3);
    }

    #[tokio::test]
    async fn should_succeed_on_last_attempt() {
        let transport = ScriptedTransport::succeeding_on(5);
        let client = client(5, transport.clone());

        assert_ok!(client.get("http://example.com/", RequestOptions::new()).await);
        assert_eq!(transport.attempt_count(), 5);
    }

    #[tokio::test]
    async fn should_not_attempt_without_proxy_source() {
        let transport = ScriptedTransport::succeeding_on(1);
        let client = ProxiedClient::with_transport(ClientConfig::builder().build(), transport.clone());

        let err = client.get("http://example.com/", RequestOptions::new()).await.unwrap_err();
        assert!(matches!(err, Error::NoProxySource(NoProxySource)));
        assert_eq!(client.ready().await, Err(NoProxySource));
        assert_eq!(transport.attempt_count(), 0);
    }

    #[tokio::test]
    async fn should_fail_on_empty_pool_without_retrying() {
        let transport = ScriptedTransport::succeeding_on(1);
        let client = client(5, transport.clone());
        client.pool().replace(Vec::new());

        let err = client.get("http://example.com/", RequestOptions::new()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyPool));
        assert_eq!(transport.attempt_count(), 0);
    }

    #[tokio::test]
    async fn should_apply_timeouts_per_attempt() {
        let transport = ScriptedTransport::succeeding_on(2);
        let client = client(5, transport.clone());
        assert_eq!(client.timeout(), Duration::from_millis(5000));

        assert_ok!(client.get("http://example.com/", RequestOptions::new()).await);
        client.set_timeout(Duration::from_secs(60));
        assert_ok!(client.get("http://example.com/", RequestOptions::new()).await);

        let attempts = transport.attempts.lock();
        assert_eq!(attempts[0].2, Timeouts::from_configured(Duration::from_millis(5000)));
        assert_eq!(attempts[0].2.request, Duration::from_secs(30));
        assert_eq!(attempts[2].2.connect, Duration::from_secs(60));
        assert_eq!(attempts[2].2.request, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn should_build_requests_from_helpers() {
        let transport = ScriptedTransport::succeeding_on(1);
        let client = client(1, transport.clone());
        let options = RequestOptions::new()
            .header(http::header::ACCEPT, http::HeaderValue::from_static("text/plain"))
            .query("page", "2");

        assert_ok!(client.post("http://example.com/items", "payload", options.clone()).await);
        assert_ok!(client.put("http://example.com/items/1", "payload", RequestOptions::new()).await);
        assert_ok!(client.patch("http://example.com/items/1", "payload", RequestOptions::new()).await);
        assert_ok!(client.delete("http://example.com/items/1", RequestOptions::new()).await);
        assert_ok!(client.head("http://example.com/", RequestOptions::new()).await);
        assert_ok!(client.options("http://example.com/", RequestOptions::new()).await);

        let attempts = transport.attempts.lock();
        let methods: Vec<Method> = attempts.iter().map(|(_, request, _)| request.method().clone()).collect();
        assert_eq!(
            methods,
            vec![Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::HEAD, Method::OPTIONS]
        );

        let post = &attempts[0].1;
        assert_eq!(post.url().as_str(), "http://example.com/items?page=2");
        assert_eq!(post.headers()[http::header::ACCEPT], "text/plain");
        assert_eq!(post.body().and_then(|body| body.as_bytes()), Some(&b"payload"[..]));
        assert!(attempts[3].1.body().is_none());
    }

    #[tokio::test]
    async fn should_reject_invalid_url() {
        let transport = ScriptedTransport::succeeding_on(1);
        let client = client(1, transport.clone());

        let err = client.get("not a url", RequestOptions::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(transport.attempt_count(), 0);
    }

    #[tokio::test]
    async fn should_keep_serving_requests_when_refresh_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let config = ClientConfig::builder()
            .proxies(proxies())
            .proxy_url(server.uri())
            .config_dir(dir.path())
            .build();
        let transport = ScriptedTransport::succeeding_on(1);
        let client = ProxiedClient::with_transport(config, transport.clone());
        assert_ok!(client.ready().await);

        let refresh = client.pool().refresh();
        let request = client.get("http://example.com/", RequestOptions::new());
        let (_, response) = tokio::join!(refresh, request);

        assert_eq!(response.unwrap().status(), 200);
        assert_eq!(*client.pool().proxies(), proxies());
        assert_ok!(client.get("http://example.com/", RequestOptions::new()).await);
        assert_eq!(transport.attempt_count(), 2);
    }

    #[tokio::test]
    async fn should_load_client_from_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("proxies.txt");
        std::fs::write(&file, "bad:1080\n5.6.7.8:1080:u:p\n").unwrap();

        let client = ProxiedClient::from_file(&file, ClientConfig::default()).await.unwrap();
        assert_ok!(client.ready().await);
        assert_eq!(
            *client.pool().proxies(),
            vec![ProxyEndpoint::new("5.6.7.8", 1080).with_credentials("u", "p")]
        );

        let missing = ProxiedClient::from_file(dir.path().join("missing.txt"), ClientConfig::default()).await;
        assert!(matches!(missing, Err(Error::MissingFile(_))));
    }
}
