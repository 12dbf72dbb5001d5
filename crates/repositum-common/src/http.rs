//! Host-capped HTTP clients shared by every harvester component.
//!
//! Two long-lived clients are built per run: a JSON API client that retries
//! transient statuses with exponential backoff, and an HTML/binary client
//! with no automatic retry. Both refuse to talk to hosts outside their
//! allowlist so a misconfigured base URL cannot turn the job into a crawler.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::error::{HarvestError, Result};

/// Hosts every harvester client may reach.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "repositum.tuwien.at", // reposiTUm REST + item pages
    "hdl.handle.net",      // Handle resolver
    "api.crossref.org",    // CrossRef works API
    "doi.org",             // DOI content negotiation
    "link.springer.com",   // Springer abstract pages
    "localhost",
    "127.0.0.1",
];

/// Automatic retry policy applied by [`HttpClient::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Sleep before retry `n` is `backoff_factor * 2^(n-1)`.
    pub backoff_factor: Duration,
    pub status_forcelist: Vec<u16>,
}

impl RetryPolicy {
    /// No automatic retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_factor: Duration::ZERO,
            status_forcelist: Vec::new(),
        }
    }

    /// Retry 429/500/502/503/504 and connection failures.
    pub fn transient(max_retries: u32, backoff_factor: Duration) -> Self {
        Self {
            max_retries,
            backoff_factor,
            status_forcelist: vec![429, 500, 502, 503, 504],
        }
    }

    pub fn retries_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status.as_u16())
    }

    pub fn delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.backoff_factor.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transient(3, Duration::from_secs(1))
    }
}

/// Construction parameters for an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    /// Default `Accept` header; individual requests may override it.
    pub accept: Option<String>,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub allowed_hosts: Vec<String>,
}

impl ClientConfig {
    /// JSON API client: `Accept: application/json` and transient-status retry.
    pub fn api() -> Self {
        Self {
            user_agent: "repositum-pdf-fetcher/1.1".to_string(),
            accept: Some("application/json".to_string()),
            connect_timeout: Duration::from_secs(8),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            allowed_hosts: default_hosts(),
        }
    }

    /// HTML and PDF client: no default `Accept`, no automatic retry.
    pub fn html() -> Self {
        Self {
            user_agent: "repositum-pdf-scraper/1.1".to_string(),
            accept: None,
            connect_timeout: Duration::from_secs(8),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::none(),
            allowed_hosts: default_hosts(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn default_hosts() -> Vec<String> {
    DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect()
}

/// A host-capped `reqwest::Client` with an attached retry policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    allowlist: HashSet<String>,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(accept) = &config.accept {
            let value = reqwest::header::HeaderValue::from_str(accept)
                .map_err(|e| HarvestError::Config(format!("Invalid Accept header {accept:?}: {e}")))?;
            headers.insert(reqwest::header::ACCEPT, value);
        }

        let client = ClientBuilder::new()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            allowlist: config.allowed_hosts.into_iter().collect(),
            retry: config.retry,
        })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Same connection pool, headers and allowlist, but every request is sent once.
    pub fn without_retry(&self) -> Self {
        Self { retry: RetryPolicy::none(), ..self.clone() }
    }

    /// Exact host match or subdomain of an allowed host.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    pub fn get(&self, url: &str) -> Result<RequestBuilder> {
        if !self.is_allowed(url) {
            return Err(HarvestError::Blocked(format!(
                "host not in allowlist for URL {url}"
            )));
        }
        Ok(self.client.get(url))
    }

    /// Sends `request`, retrying per the client's [`RetryPolicy`].
    ///
    /// When retries run out on a retryable status the last response is
    /// returned as-is; callers inspect the status themselves.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let mut retry = 0;
        loop {
            let Some(attempt) = request.try_clone() else {
                return Ok(request.send().await?);
            };
            let can_retry = retry < self.retry.max_retries;
            match attempt.send().await {
                Ok(resp) if can_retry && self.retry.retries_status(resp.status()) => {
                    warn!(status = %resp.status(), url = %resp.url(), retry = retry + 1, "Transient status, retrying");
                }
                Ok(resp) => return Ok(resp),
                Err(e) if can_retry && (e.is_connect() || e.is_timeout()) => {
                    warn!(error = %e, retry = retry + 1, "Request failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }
            retry += 1;
            let delay = self.retry.delay(retry);
            debug!(?delay, "Backing off");
            tokio::time::sleep(delay).await;
        }
    }

    /// `GET url` through the retry policy.
    pub async fn fetch(&self, url: &str) -> Result<Response> {
        let request = self.get(url)?;
        self.send(request).await
    }
}
