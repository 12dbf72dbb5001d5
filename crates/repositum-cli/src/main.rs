//! repositum — publication and PDF harvester for reposiTUm orgunits.
//! Entry point for the harvester binary.

mod config;

use anyhow::Context;
use repositum_common::HttpClient;
use repositum_ingestion::abstracts::AbstractFetcher;
use repositum_ingestion::handle::HandleResolver;
use repositum_ingestion::harvest::{HarvestQuery, Harvester};
use repositum_ingestion::pdf::{PdfDownloader, PdfFetcher, PdfLinkScraper};
use repositum_ingestion::pipeline::{run_pipeline, HarvestJob};
use repositum_ingestion::sources::repositum::RepositumClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn build_clients(config: &config::Config) -> anyhow::Result<(HttpClient, HttpClient)> {
    let mut api = HttpClient::new(config.api_client_config()).context("building API client")?;
    let mut html = HttpClient::new(config.html_client_config()).context("building HTML client")?;
    for host in config.extra_hosts() {
        api.allow_domain(&host);
        html.allow_domain(&host);
    }
    Ok((api, html))
}

fn build_pdf_fetcher(config: &config::Config, html: &HttpClient) -> anyhow::Result<PdfFetcher> {
    let repo_url = config.repository_url()?;
    let resolver = HandleResolver::new(
        &config.repository.handle_prefix,
        repo_url.host_str().unwrap_or_default(),
        &config.repository.resolver_host,
    );
    let scraper = PdfLinkScraper::new(html.clone(), &config.repository.base_url)?;
    let downloader = PdfDownloader::new(html.clone(), &config.output.pdf_dir)
        .with_max_name_len(config.output.max_filename_len);
    Ok(PdfFetcher::new(resolver, scraper, downloader))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("repositum=debug,info")),
        )
        .init();

    let config = config::Config::load().context("loading configuration")?;
    info!(
        orgunit = %config.repository.orgunit_id,
        queries = config.queries.len(),
        pdfs = config.harvest.download_pdfs,
        enrich = config.enrich.enabled,
        "Harvester starting"
    );

    let (api, html) = build_clients(&config)?;

    let repo = RepositumClient::new(api.clone()).with_base_url(&config.repository.base_url);
    let queries = config
        .queries
        .iter()
        .map(|q| HarvestQuery {
            url: repo.listing_url(&q.endpoint, &config.repository.orgunit_id, q.from),
            kind: q.kind,
        })
        .collect();

    let pdfs = if config.harvest.download_pdfs {
        Some(build_pdf_fetcher(&config, &html)?)
    } else {
        None
    };
    let harvester = Harvester::new(repo, pdfs, config.harvest_options());

    let abstracts = config
        .enrich
        .enabled
        .then(|| AbstractFetcher::standard(api.clone(), html.clone(), &config.abstract_endpoints()));

    let job = HarvestJob {
        queries,
        csv_path: config.output.csv_path.clone(),
        enriched_csv_path: config.enrich.enabled.then(|| config.enrich.csv_path.clone()),
    };
    let report = run_pipeline(&job, &harvester, abstracts.as_ref()).await?;

    info!("Run report:\n{}", serde_json::to_string_pretty(&report)?);
    println!("Saved {} rows to {}", report.rows_written, job.csv_path.display());
    Ok(())
}
