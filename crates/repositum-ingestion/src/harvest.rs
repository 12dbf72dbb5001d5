//! Paginated harvesting of one orgunit listing.
//!
//! Pages are requested sequentially with an `offset` parameter. The declared
//! total is read from the first successful page and frozen for the rest of
//! the run; the offset advances by the number of items actually returned.
//! A page that is unavailable twice in a row ends the harvest early, keeping
//! whatever rows were already collected.

use std::time::Duration;

use repositum_common::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::models::{ItemMetadata, PublicationKind, PublicationRecord};
use crate::pdf::PdfFetcher;
use crate::sources::repositum::RepositumClient;

/// How far into titles the per-item log line quotes.
const TITLE_LOG_CHARS: usize = 70;

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub start_offset: usize,
    /// Stop after this many successfully processed items (`None` or 0: no cap).
    pub max_items: Option<usize>,
    /// Pause after every item, throttling requests to the repository.
    pub item_delay: Duration,
    /// Pause before the single retry of an unavailable page.
    pub page_retry_delay: Duration,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            start_offset: 0,
            max_items: None,
            item_delay: Duration::from_millis(30),
            page_retry_delay: Duration::from_secs(2),
        }
    }
}

/// One listing to harvest.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestQuery {
    pub url: String,
    pub kind: PublicationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Offset reached the declared total.
    Exhausted,
    /// A page came back without items.
    EmptyPage,
    /// The page at this offset failed twice.
    Unavailable { offset: usize },
    /// The processed-item cap was reached.
    MaxItems,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub kind: PublicationKind,
    pub pages_fetched: usize,
    pub items_processed: usize,
    pub items_skipped: usize,
    pub declared_total: u64,
    pub stop_reason: StopReason,
}

pub struct Harvester {
    repo: RepositumClient,
    pdfs: Option<PdfFetcher>,
    options: HarvestOptions,
}

impl Harvester {
    pub fn new(repo: RepositumClient, pdfs: Option<PdfFetcher>, options: HarvestOptions) -> Self {
        Self { repo, pdfs, options }
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    pub fn repository(&self) -> &RepositumClient {
        &self.repo
    }

    /// Harvest `query`, appending one row per processed item to `rows`.
    ///
    /// Only a malformed listing body is an error; every other failure ends
    /// in a summary with the matching [`StopReason`].
    #[instrument(skip(self, rows), fields(kind = query.kind.as_str()))]
    pub async fn harvest(
        &self,
        query: &HarvestQuery,
        rows: &mut Vec<PublicationRecord>,
    ) -> Result<HarvestSummary> {
        let cap = self.options.max_items.filter(|&n| n > 0);
        let mut offset = self.options.start_offset;
        let mut declared: Option<u64> = None;
        let mut summary = HarvestSummary {
            kind: query.kind,
            pages_fetched: 0,
            items_processed: 0,
            items_skipped: 0,
            declared_total: 0,
            stop_reason: StopReason::Exhausted,
        };

        loop {
            let page = match self.repo.fetch_page(&query.url, offset).await? {
                Some(page) => page,
                None => {
                    warn!(offset, delay = ?self.options.page_retry_delay, "Page unavailable, retrying once");
                    tokio::time::sleep(self.options.page_retry_delay).await;
                    match self.repo.fetch_page(&query.url, offset).await? {
                        Some(page) => page,
                        None => {
                            warn!(offset, "Page still unavailable, stopping");
                            summary.stop_reason = StopReason::Unavailable { offset };
                            break;
                        }
                    }
                }
            };
            summary.pages_fetched += 1;

            let total = *declared.get_or_insert(page.number_of_items);
            summary.declared_total = total;
            if page.items.is_empty() {
                info!(offset, "No more items, stopping");
                summary.stop_reason = StopReason::EmptyPage;
                break;
            }

            let shown_end = ((offset + page.items.len()) as u64).min(total);
            info!("Items {}-{} of ~{} (type={})", offset + 1, shown_end, total, query.kind.as_str());

            for item in &page.items {
                match self.process_item(item, query.kind).await {
                    Ok(record) => {
                        rows.push(record);
                        summary.items_processed += 1;
                        if cap.is_some_and(|n| summary.items_processed >= n) {
                            info!(max_items = ?cap, "Reached max_items, stopping");
                            summary.stop_reason = StopReason::MaxItems;
                            return Ok(summary);
                        }
                    }
                    Err(e) => {
                        warn!(offset, error = %e, "Skipping one item");
                        summary.items_skipped += 1;
                    }
                }
                if !self.options.item_delay.is_zero() {
                    tokio::time::sleep(self.options.item_delay).await;
                }
            }

            offset += page.items.len();
            if total > 0 && offset as u64 >= total {
                summary.stop_reason = StopReason::Exhausted;
                break;
            }
        }

        Ok(summary)
    }

    async fn process_item(&self, item: &serde_json::Value, kind: PublicationKind) -> Result<PublicationRecord> {
        let meta = ItemMetadata::from_item(item)?;
        let title = meta.title();

        let pdfs = match &self.pdfs {
            Some(fetcher) => fetcher.fetch_for_item(&meta, &title).await,
            None => Vec::new(),
        };
        let short: String = title.chars().take(TITLE_LOG_CHARS).collect();
        if pdfs.is_empty() {
            debug!(title = %short, "No repository PDF");
        } else {
            info!(title = %short, count = pdfs.len(), "PDF(s) downloaded");
        }

        Ok(PublicationRecord::from_metadata(&meta, kind, &pdfs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Mock, ServerGuard};
    use repositum_common::{ClientConfig, HttpClient, RetryPolicy};
    use serde_json::json;

    fn item(title: &str) -> serde_json::Value {
        json!({ "metadata": [
            { "key": "dc.title", "value": title },
            { "key": "dc.type", "value": "Article", "language": "en" },
        ]})
    }

    fn page_body(total: u64, titles: &[&str]) -> String {
        let items: Vec<_> = titles.iter().map(|t| item(t)).collect();
        json!({ "numberOfItems": total, "items": items }).to_string()
    }

    async fn page_mock(server: &mut ServerGuard, offset: usize, status: usize, body: &str, hits: usize) -> Mock {
        server
            .mock("GET", Matcher::Regex(r"^/rest/orgunit/".into()))
            .match_query(Matcher::UrlEncoded("offset".into(), offset.to_string()))
            .with_status(status)
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    fn harvester(server: &ServerGuard, max_items: Option<usize>) -> (Harvester, HarvestQuery) {
        let api = HttpClient::new(ClientConfig::api().with_retry(RetryPolicy::none())).unwrap();
        let repo = RepositumClient::new(api).with_base_url(&server.url());
        let query = HarvestQuery {
            url: repo.listing_url("publications_full", "1601", 2018),
            kind: PublicationKind::Publication,
        };
        let options = HarvestOptions {
            max_items,
            item_delay: Duration::ZERO,
            page_retry_delay: Duration::ZERO,
            ..Default::default()
        };
        (Harvester::new(repo, None, options), query)
    }

    #[tokio::test]
    async fn test_two_pages_then_stop() {
        let mut server = mockito::Server::new_async().await;
        let p0 = page_mock(&mut server, 0, 200, &page_body(5, &["a", "b", "c"]), 1).await;
        let p3 = page_mock(&mut server, 3, 200, &page_body(5, &["d", "e"]), 1).await;
        let p5 = page_mock(&mut server, 5, 200, &page_body(5, &[]), 0).await;

        let (h, query) = harvester(&server, None);
        let mut rows = Vec::new();
        let summary = h.harvest(&query, &mut rows).await.unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(), ["a", "b", "c", "d", "e"]);
        assert_eq!(rows[0].pub_type, "Article");
        assert_eq!(summary.pages_fetched, 2);
        assert_eq!(summary.stop_reason, StopReason::Exhausted);
        p0.assert_async().await;
        p3.assert_async().await;
        p5.assert_async().await;
    }

    #[tokio::test]
    async fn test_max_items_stops_mid_page() {
        let mut server = mockito::Server::new_async().await;
        let p0 = page_mock(&mut server, 0, 200, &page_body(10, &["a", "b", "c", "d", "e"]), 1).await;
        let p5 = page_mock(&mut server, 5, 200, &page_body(10, &["f"]), 0).await;

        let (h, query) = harvester(&server, Some(2));
        let mut rows = Vec::new();
        let summary = h.harvest(&query, &mut rows).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(summary.stop_reason, StopReason::MaxItems);
        p0.assert_async().await;
        p5.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_items_are_skipped() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "numberOfItems": 3,
            "items": [item("ok"), { "uuid": "no-metadata" }, item("also ok")],
        })
        .to_string();
        let _p0 = page_mock(&mut server, 0, 200, &body, 1).await;

        let (h, query) = harvester(&server, None);
        let mut rows = Vec::new();
        let summary = h.harvest(&query, &mut rows).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(summary.items_skipped, 1);
        assert_eq!(summary.stop_reason, StopReason::Exhausted);
    }

    #[tokio::test]
    async fn test_single_retry_then_stop_keeps_rows() {
        let mut server = mockito::Server::new_async().await;
        let _p0 = page_mock(&mut server, 0, 200, &page_body(6, &["a", "b", "c"]), 1).await;
        let p3 = page_mock(&mut server, 3, 503, "", 2).await;

        let (h, query) = harvester(&server, None);
        let mut rows = Vec::new();
        let summary = h.harvest(&query, &mut rows).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(summary.stop_reason, StopReason::Unavailable { offset: 3 });
        p3.assert_async().await;
    }

    #[tokio::test]
    async fn test_unavailable_page_costs_two_requests_with_retrying_client() {
        let mut server = mockito::Server::new_async().await;
        let p0 = page_mock(&mut server, 0, 503, "", 2).await;

        // Wired like the binary: the shared API client retries transient statuses.
        let api = HttpClient::new(ClientConfig::api().with_retry(RetryPolicy::transient(3, Duration::ZERO))).unwrap();
        let repo = RepositumClient::new(api).with_base_url(&server.url());
        let query = HarvestQuery {
            url: repo.listing_url("publications_full", "1601", 2018),
            kind: PublicationKind::Publication,
        };
        let options = HarvestOptions { page_retry_delay: Duration::ZERO, ..Default::default() };
        let h = Harvester::new(repo, None, options);

        let mut rows = Vec::new();
        let summary = h.harvest(&query, &mut rows).await.unwrap();

        assert!(rows.is_empty());
        assert_eq!(summary.stop_reason, StopReason::Unavailable { offset: 0 });
        p0.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let mut server = mockito::Server::new_async().await;
        let failing = page_mock(&mut server, 0, 500, "", 1).await;
        let ok = page_mock(&mut server, 0, 200, &page_body(1, &["a"]), 1).await;

        let (h, query) = harvester(&server, None);
        let mut rows = Vec::new();
        h.harvest(&query, &mut rows).await.unwrap();

        assert_eq!(rows.len(), 1);
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_total_is_frozen_at_first_read() {
        let mut server = mockito::Server::new_async().await;
        let _p0 = page_mock(&mut server, 0, 200, &page_body(2, &["a"]), 1).await;
        // Later pages claim a larger total; the first value still governs.
        let _p1 = page_mock(&mut server, 1, 200, &page_body(50, &["b"]), 1).await;
        let p2 = page_mock(&mut server, 2, 200, &page_body(50, &["c"]), 0).await;

        let (h, query) = harvester(&server, None);
        let mut rows = Vec::new();
        let summary = h.harvest(&query, &mut rows).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(summary.declared_total, 2);
        p2.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_total_runs_until_empty_page() {
        let mut server = mockito::Server::new_async().await;
        let _p0 = page_mock(&mut server, 0, 200, &json!({ "items": [item("a"), item("b")] }).to_string(), 1).await;
        let _p2 = page_mock(&mut server, 2, 200, &json!({ "items": [] }).to_string(), 1).await;

        let (h, query) = harvester(&server, None);
        let mut rows = Vec::new();
        let summary = h.harvest(&query, &mut rows).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(summary.stop_reason, StopReason::EmptyPage);
    }
}
