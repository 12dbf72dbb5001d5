//! reposiTUm (DSpace) REST client.
//!
//! Endpoint shape:
//!   {base}/rest/orgunit/{listing}/tiss_id/{orgunit}?count=true&recursive=true&from={year}
//! paginated with an appended `offset` parameter. Each page carries
//! `numberOfItems` and an `items` array whose elements hold a flat
//! `metadata` array of `{key, value, language}` triples.

use repositum_common::{HarvestError, HttpClient, Result};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

pub const DEFAULT_BASE_URL: &str = "https://repositum.tuwien.at";

/// Listing of publications authored within an orgunit.
pub const PUBLICATIONS_LISTING: &str = "publications_full";
/// Listing of theses supervised within an orgunit.
pub const THESES_LISTING: &str = "supervised_full";

/// One page of the orgunit listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RestPage {
    #[serde(rename = "numberOfItems", default)]
    pub number_of_items: u64,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

pub struct RepositumClient {
    client: HttpClient,
    base_url: String,
}

impl RepositumClient {
    /// The client's automatic retry is switched off: an unavailable page is
    /// retried exactly once, by the harvester.
    pub fn new(client: HttpClient) -> Self {
        Self { client: client.without_retry(), base_url: DEFAULT_BASE_URL.to_string() }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the paginated listing URL for one orgunit.
    pub fn listing_url(&self, listing: &str, orgunit_id: &str, from_year: u32) -> String {
        format!(
            "{}/rest/orgunit/{}/tiss_id/{}?count=true&recursive=true&from={}",
            self.base_url, listing, orgunit_id, from_year
        )
    }

    /// Fetch the page at `offset`.
    ///
    /// `Ok(None)` means the endpoint was unavailable (non-success status or
    /// transport failure); a body that is not a listing object is an error.
    #[instrument(skip(self))]
    pub async fn fetch_page(&self, query_url: &str, offset: usize) -> Result<Option<RestPage>> {
        let sep = if query_url.contains('?') { '&' } else { '?' };
        let url = format!("{query_url}{sep}offset={offset}");

        let resp = match self.client.fetch(&url).await {
            Ok(resp) => resp,
            Err(HarvestError::Http(e)) => {
                warn!(offset, error = %e, "Page request failed");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if !resp.status().is_success() {
            warn!(offset, status = %resp.status(), "Page request returned non-success status");
            return Ok(None);
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(offset, error = %e, "Page body could not be read");
                return Ok(None);
            }
        };
        let root: serde_json::Value = serde_json::from_str(&body)?;
        if !root.is_object() {
            return Err(HarvestError::Response(format!("listing at offset {offset} is not a JSON object")));
        }
        let page: RestPage = serde_json::from_value(root)?;
        debug!(offset, items = page.items.len(), total = page.number_of_items, "Fetched page");
        Ok(Some(page))
    }
}
