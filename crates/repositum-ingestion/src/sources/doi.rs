//! DOI content negotiation, second stage of the abstract fallback chain.
//!
//! Asks the resolver for `application/json` metadata instead of the landing
//! page redirect. Only some registration agencies include an abstract.

use async_trait::async_trait;
use repositum_common::HttpClient;
use reqwest::header::ACCEPT;
use tracing::{debug, instrument};

use super::{non_empty, AbstractSource};

pub const DOI_RESOLVER_BASE: &str = "https://doi.org";

pub struct DoiNegotiationClient {
    client: HttpClient,
    base_url: String,
}

impl DoiNegotiationClient {
    pub fn new(client: HttpClient) -> Self {
        Self { client, base_url: DOI_RESOLVER_BASE.to_string() }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AbstractSource for DoiNegotiationClient {
    fn name(&self) -> &'static str {
        "doi-negotiation"
    }

    #[instrument(skip(self))]
    async fn fetch_abstract(&self, doi: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/{}", self.base_url, doi);
        let request = self.client.get(&url)?.header(ACCEPT, "application/json");
        let resp = self.client.send(request).await?.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        let abstract_text = body["abstract"].as_str().map(String::from);
        debug!(found = abstract_text.is_some(), "DOI negotiation lookup");
        Ok(non_empty(abstract_text))
    }
}
