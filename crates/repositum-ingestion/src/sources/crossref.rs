//! CrossRef works API, first stage of the abstract fallback chain.
//!
//! API: https://api.crossref.org/works/{doi}

use async_trait::async_trait;
use repositum_common::HttpClient;
use tracing::{debug, instrument};

use super::{non_empty, AbstractSource};

pub const CR_API_BASE: &str = "https://api.crossref.org/works";

pub struct CrossRefClient {
    client: HttpClient,
    base_url: String,
}

impl CrossRefClient {
    pub fn new(client: HttpClient) -> Self {
        Self { client, base_url: CR_API_BASE.to_string() }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AbstractSource for CrossRefClient {
    fn name(&self) -> &'static str {
        "crossref"
    }

    #[instrument(skip(self))]
    async fn fetch_abstract(&self, doi: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/{}", self.base_url, doi);
        let resp = self.client.fetch(&url).await?.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        let abstract_text = body["message"]["abstract"].as_str().map(strip_jats);
        debug!(found = abstract_text.is_some(), "CrossRef lookup");
        Ok(non_empty(abstract_text))
    }
}

/// CrossRef returns JATS XML snippets in abstracts; strip the common tags.
pub fn strip_jats(raw: &str) -> String {
    raw.replace("<jats:title>Abstract</jats:title>", "")
        .replace("<jats:p>", "").replace("</jats:p>", "\n")
        .replace("<jats:italic>", "").replace("</jats:italic>", "")
        .replace("<jats:bold>", "").replace("</jats:bold>", "")
        .replace("<jats:sub>", "").replace("</jats:sub>", "")
        .replace("<jats:sup>", "").replace("</jats:sup>", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use repositum_common::{ClientConfig, RetryPolicy};

    fn client(server: &mockito::Server) -> CrossRefClient {
        let http = HttpClient::new(ClientConfig::api().with_retry(RetryPolicy::none())).unwrap();
        CrossRefClient::new(http).with_base_url(&format!("{}/works", server.url()))
    }

    #[test]
    fn test_jats_tag_stripping() {
        let raw = "<jats:p>Hello <jats:italic>world</jats:italic>.</jats:p>";
        assert_eq!(strip_jats(raw), "Hello world.");
    }

    #[tokio::test]
    async fn test_reads_message_abstract() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/10.1000/test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": {"abstract": "<jats:p>Test abstract.</jats:p>"}}"#)
            .create_async()
            .await;

        let got = client(&server).fetch_abstract("10.1000/test").await.unwrap();
        assert_eq!(got.as_deref(), Some("Test abstract."));
    }

    #[tokio::test]
    async fn test_missing_abstract_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/works/10.1000/none")
            .with_status(200)
            .with_body(r#"{"message": {"title": ["No abstract here"]}}"#)
            .create_async()
            .await;

        assert_eq!(client(&server).fetch_abstract("10.1000/none").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_not_found_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/works/10.1000/gone").with_status(404).create_async().await;

        assert!(client(&server).fetch_abstract("10.1000/gone").await.is_err());
    }
}
