//! Springer article pages, last stage of the abstract fallback chain.

use async_trait::async_trait;
use repositum_common::HttpClient;
use reqwest::header::ACCEPT;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use super::{non_empty, AbstractSource};

pub const SPRINGER_BASE: &str = "https://link.springer.com";

pub struct SpringerClient {
    client: HttpClient,
    base_url: String,
}

impl SpringerClient {
    pub fn new(client: HttpClient) -> Self {
        Self { client, base_url: SPRINGER_BASE.to_string() }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AbstractSource for SpringerClient {
    fn name(&self) -> &'static str {
        "springer"
    }

    #[instrument(skip(self))]
    async fn fetch_abstract(&self, doi: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/{}", self.base_url, doi);
        let request = self.client.get(&url)?.header(ACCEPT, "text/html");
        let html = self.client.send(request).await?.error_for_status()?.text().await?;
        let abstract_text = extract_abstract(&html);
        debug!(found = abstract_text.is_some(), "Springer page scraped");
        Ok(non_empty(abstract_text))
    }
}

/// Text of the first paragraph inside `div#Abs1-content`.
pub fn extract_abstract(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let container = Selector::parse("div#Abs1-content").unwrap();
    let paragraph = Selector::parse("p").unwrap();

    document
        .select(&container)
        .next()?
        .select(&paragraph)
        .next()
        .map(|p| p.text().collect::<String>())
}
