//! Full harvest run against a mock repository.
//!
//! Run with: cargo test --package repositum-ingestion --test test_pipeline_e2e

use std::time::Duration;

use mockito::Matcher;
use repositum_common::{ClientConfig, HttpClient, RetryPolicy};
use repositum_ingestion::abstracts::AbstractFetcher;
use repositum_ingestion::enrich::EnrichedRecord;
use repositum_ingestion::handle::HandleResolver;
use repositum_ingestion::harvest::{HarvestOptions, HarvestQuery, Harvester, StopReason};
use repositum_ingestion::models::{PublicationKind, PublicationRecord};
use repositum_ingestion::pdf::{PdfDownloader, PdfFetcher, PdfLinkScraper};
use repositum_ingestion::pipeline::{run_pipeline, HarvestJob};
use repositum_ingestion::sources::crossref::CrossRefClient;
use repositum_ingestion::sources::repositum::{RepositumClient, PUBLICATIONS_LISTING};
use serde_json::json;

fn listing_body() -> String {
    json!({
        "numberOfItems": 2,
        "items": [
            { "metadata": [
                { "key": "tuw.publication.orgunit", "value": "E194-01 - Research Unit" },
                { "key": "dc.title", "value": "Graph Rewriting" },
                { "key": "dc.type", "value": "Article", "language": "en" },
                { "key": "dc.date.issued", "value": "2021-03-01" },
                { "key": "dc.contributor.author", "value": "Doe, Jane" },
                { "key": "dc.identifier.uri", "value": "http://hdl.handle.net/20.500.12708/77" },
                { "key": "dc.description.abstract", "value": "Rewriting graphs.", "language": "en" },
            ]},
            { "metadata": [
                { "key": "dc.title", "value": "No Files" },
                { "key": "dc.date.issued", "value": "2019" },
                { "key": "tuw.publisher.doi", "value": "10.1000/nofiles" },
            ]},
        ],
    })
    .to_string()
}

#[tokio::test]
async fn test_harvest_download_and_enrich() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut server = mockito::Server::new_async().await;

    let listing = server
        .mock("GET", Matcher::Regex(r"^/rest/orgunit/publications_full/tiss_id/1601".into()))
        .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(listing_body())
        .expect(1)
        .create_async()
        .await;
    let _handle_page = server
        .mock("GET", "/handle/20.500.12708/77")
        .with_status(200)
        .with_body(r#"<a href="/bitstream/20.500.12708/77/1/main.pdf">Download PDF</a>"#)
        .create_async()
        .await;
    let _pdf = server
        .mock("GET", "/bitstream/20.500.12708/77/1/main.pdf")
        .with_status(200)
        .with_body(b"%PDF-1.7")
        .create_async()
        .await;
    let crossref = server
        .mock("GET", "/works/10.1000/nofiles")
        .with_status(200)
        .with_body(r#"{"message": {"abstract": "<jats:p>Found via CrossRef.</jats:p>"}}"#)
        .expect(1)
        .create_async()
        .await;

    let api = HttpClient::new(ClientConfig::api().with_retry(RetryPolicy::none())).unwrap();
    let html = HttpClient::new(ClientConfig::html()).unwrap();
    let out = tempfile::tempdir().unwrap();

    let repo = RepositumClient::new(api.clone()).with_base_url(&server.url());
    let query = HarvestQuery {
        url: repo.listing_url(PUBLICATIONS_LISTING, "1601", 2018),
        kind: PublicationKind::Publication,
    };
    let pdfs = PdfFetcher::new(
        HandleResolver::default(),
        PdfLinkScraper::new(html.clone(), &server.url()).unwrap(),
        PdfDownloader::new(html, out.path().join("pdfs")),
    );
    let options = HarvestOptions {
        item_delay: Duration::ZERO,
        page_retry_delay: Duration::ZERO,
        ..Default::default()
    };
    let harvester = Harvester::new(repo, Some(pdfs), options);
    let abstracts = AbstractFetcher::new(vec![Box::new(
        CrossRefClient::new(api).with_base_url(&format!("{}/works", server.url())),
    )]);

    let job = HarvestJob {
        queries: vec![query],
        csv_path: out.path().join("works.csv"),
        enriched_csv_path: Some(out.path().join("works_enriched.csv")),
    };
    let report = run_pipeline(&job, &harvester, Some(&abstracts)).await.unwrap();

    assert_eq!(report.rows_written, 2);
    assert_eq!(report.enriched_rows, Some(2));
    assert_eq!(report.summaries.len(), 1);
    assert_eq!(report.summaries[0].stop_reason, StopReason::Exhausted);
    listing.assert_async().await;
    crossref.assert_async().await;

    let pdf_path = out.path().join("pdfs").join("Graph_Rewriting.pdf");
    assert_eq!(std::fs::read(&pdf_path).unwrap(), b"%PDF-1.7");

    let rows: Vec<PublicationRecord> = reader(&job.csv_path).deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows[0].orgunit, "E194");
    assert_eq!(rows[0].pdf_count, 1);
    assert_eq!(rows[0].pdf_paths, vec![pdf_path.display().to_string()]);
    assert_eq!(rows[1].pdf_count, 0);
    assert!(rows[1].pdf_paths.is_empty());

    let enriched: Vec<EnrichedRecord> = reader(out.path().join("works_enriched.csv").as_path())
        .deserialize()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(enriched[0].abstract_text, "Rewriting graphs.");
    assert_eq!(enriched[0].year, "2021");
    assert_eq!(enriched[1].abstract_text, "Found via CrossRef.");
    assert_eq!(enriched[1].year, "2019");
}

#[tokio::test]
async fn test_unavailable_repository_still_writes_header() {
    let mut server = mockito::Server::new_async().await;
    let listing = server
        .mock("GET", Matcher::Any)
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let api = HttpClient::new(ClientConfig::api().with_retry(RetryPolicy::none())).unwrap();
    let repo = RepositumClient::new(api).with_base_url(&server.url());
    let query = HarvestQuery {
        url: repo.listing_url(PUBLICATIONS_LISTING, "1601", 2018),
        kind: PublicationKind::Publication,
    };
    let options = HarvestOptions { page_retry_delay: Duration::ZERO, ..Default::default() };
    let harvester = Harvester::new(repo, None, options);

    let out = tempfile::tempdir().unwrap();
    let job = HarvestJob {
        queries: vec![query],
        csv_path: out.path().join("works.csv"),
        enriched_csv_path: None,
    };
    let report = run_pipeline(&job, &harvester, None).await.unwrap();

    assert_eq!(report.rows_written, 0);
    assert_eq!(report.enriched_rows, None);
    assert_eq!(report.summaries[0].stop_reason, StopReason::Unavailable { offset: 0 });
    listing.assert_async().await;
    let written = std::fs::read_to_string(&job.csv_path).unwrap();
    assert!(written.starts_with("orgunit,title,pub_type"));
    assert_eq!(written.lines().count(), 1);
}

fn reader(path: &std::path::Path) -> csv::Reader<std::fs::File> {
    csv::ReaderBuilder::new()
        .double_quote(false)
        .escape(Some(b'\\'))
        .from_path(path)
        .unwrap()
}
