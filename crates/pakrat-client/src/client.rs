use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use http::HeaderMap;
use reqwest::{Client, ClientBuilder};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use tracing::{debug, trace};

use pakrat_kv::CacheEntry;

use crate::error::FetchError;

/// Response headers that must not be replayed from the cache: hop-by-hop
/// headers, identity headers of the upstream server, and lengths that change
/// once links are rewritten. The serving layer recomputes `content-length`
/// from the final body.
const EXCLUDED_HEADERS: &[&str] = &[
    "content-encoding",
    "transfer-encoding",
    "connection",
    "content-length",
    "server",
    "x-served-by",
    "date",
];

/// A builder for an [`UpstreamClient`].
#[derive(Debug, Clone)]
pub struct UpstreamClientBuilder {
    username: Option<String>,
    password: Option<String>,
    retries: u32,
    timeout: Duration,
}

impl Default for UpstreamClientBuilder {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            retries: 3,
            timeout: Duration::from_secs(60),
        }
    }
}

impl UpstreamClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP Basic credentials attached to every upstream request.
    #[must_use]
    pub fn credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<UpstreamClient, FetchError> {
        let client_raw = raw_client(self.timeout)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(self.retries);
        let retry_strategy = RetryTransientMiddleware::new_with_policy(retry_policy);
        let client = reqwest_middleware::ClientBuilder::new(client_raw)
            .with(retry_strategy)
            .build();

        Ok(UpstreamClient {
            client,
            username: self.username,
            password: self.password,
        })
    }
}

fn raw_client(timeout: Duration) -> Result<Client, FetchError> {
    Ok(ClientBuilder::new()
        .user_agent(concat!("pakrat/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(20)
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()?)
}

/// A client for fetching metadata and file bytes from the upstream registry.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: ClientWithMiddleware,
    username: Option<String>,
    password: Option<String>,
}

impl UpstreamClient {
    fn get(&self, url: &str) -> RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }
        request
    }

    /// Fetch `url` and classify the response.
    ///
    /// 4xx answers are returned as entries: a missing project is a cacheable
    /// fact, and clients keep seeing the same answer while the upstream is
    /// unreachable. Transport failures and 5xx answers are errors; the
    /// metadata cache decides whether a stale entry masks them.
    pub async fn fetch(&self, url: &str) -> Result<CacheEntry, FetchError> {
        trace!("GET {url}");
        let response = self.get(url).send().await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FetchError::UpstreamStatus(url.to_string(), status.as_u16()));
        }

        let headers = filter_headers(response.headers());
        let content = response.text().await?;
        debug!(url, status = status.as_u16(), "fetched upstream response");

        Ok(CacheEntry {
            status_code: status.as_u16(),
            content,
            headers,
        })
    }

    /// Stream a file's bytes without buffering the body; any non-success
    /// status is an error here, since file downloads have no negative-answer
    /// caching.
    pub async fn stream(
        &self,
        url: &str,
    ) -> Result<BoxStream<'static, reqwest::Result<Bytes>>, FetchError> {
        let response = self.get(url).send().await?.error_for_status()?;
        Ok(response.bytes_stream().boxed())
    }
}

fn filter_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            !EXCLUDED_HEADERS
                .iter()
                .any(|excluded| name.as_str().eq_ignore_ascii_case(excluded))
        })
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect()
}
