//! Handle → item page → bitstream PDFs → local files.
//!
//! reposiTUm exposes no bitstream listing in the REST payload we harvest, so
//! PDFs are found by scraping the item's public HTML page for
//! `/bitstream/` anchors and streaming each match to disk.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Response;
use scraper::{Html, Selector};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use repositum_common::{HttpClient, Result};

use crate::handle::HandleResolver;
use crate::models::{ItemMetadata, PdfAsset};
use crate::sanitize::{safe_filename, unique_path, with_pdf_extension, DEFAULT_MAX_LEN};

/// Write buffer size for streamed downloads (256 KiB).
pub const DOWNLOAD_CHUNK_SIZE: usize = 256 * 1024;

const PAGE_TIMEOUT: Duration = Duration::from_secs(25);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

// ── Link scraping ─────────────────────────────────────────────────────────────

pub struct PdfLinkScraper {
    client: HttpClient,
    base_url: Url,
}

impl PdfLinkScraper {
    pub fn new(client: HttpClient, base_url: &str) -> Result<Self> {
        Ok(Self { client, base_url: Url::parse(base_url)? })
    }

    /// Absolute PDF URLs linked from the handle's item page, sorted.
    ///
    /// Any failure to load the page yields an empty list.
    #[instrument(skip(self))]
    pub async fn scrape(&self, handle: &str) -> Vec<String> {
        if handle.is_empty() {
            return Vec::new();
        }
        let url = format!("{}/handle/{}", self.base_url.as_str().trim_end_matches('/'), handle);

        let request = match self.client.get(&url) {
            Ok(r) => r.header(ACCEPT, "text/html").timeout(PAGE_TIMEOUT),
            Err(e) => {
                warn!(%url, error = %e, "Handle page blocked");
                return Vec::new();
            }
        };
        let resp = match self.client.send(request).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(%url, error = %e, "Handle request error");
                return Vec::new();
            }
        };
        if !resp.status().is_success() {
            warn!(%url, status = %resp.status(), "Handle page unavailable");
            return Vec::new();
        }
        match resp.text().await {
            Ok(html) => extract_pdf_links(&html, &self.base_url),
            Err(e) => {
                warn!(%url, error = %e, "Handle page body unreadable");
                Vec::new()
            }
        }
    }
}

/// Bitstream anchors that look like PDFs, resolved against `base`.
///
/// An anchor qualifies when its href contains `/bitstream/` and either the
/// href ends in `.pdf`, its `type` attribute mentions pdf, or its text does.
pub fn extract_pdf_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").unwrap();

    let mut pdfs = BTreeSet::new();
    for a in document.select(&anchors) {
        let Some(href) = a.value().attr("href") else { continue };
        if !href.contains("/bitstream/") {
            continue;
        }
        let by_extension = href.to_lowercase().ends_with(".pdf");
        let by_type = a.value().attr("type").unwrap_or("").to_lowercase().contains("pdf");
        let by_text = a.text().collect::<String>().to_lowercase().contains("pdf");
        if !(by_extension || by_type || by_text) {
            continue;
        }
        match base.join(href) {
            Ok(abs) => {
                pdfs.insert(abs.to_string());
            }
            Err(e) => debug!(href, error = %e, "Skipping unresolvable bitstream link"),
        }
    }
    pdfs.into_iter().collect()
}

// ── Downloading ───────────────────────────────────────────────────────────────

pub struct PdfDownloader {
    client: HttpClient,
    dest_dir: PathBuf,
    max_name_len: usize,
}

impl PdfDownloader {
    pub fn new(client: HttpClient, dest_dir: impl Into<PathBuf>) -> Self {
        Self { client, dest_dir: dest_dir.into(), max_name_len: DEFAULT_MAX_LEN }
    }

    pub fn with_max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Local file name for `url`, named after `hint` when it is non-empty.
    pub fn file_name(&self, url: &str, hint: &str) -> String {
        let basename = url_basename(url);
        let source = if !hint.trim().is_empty() {
            hint
        } else if !basename.is_empty() {
            basename.as_str()
        } else {
            "document"
        };
        with_pdf_extension(&safe_filename(source, self.max_name_len, "file"))
    }

    /// Stream `url` into the destination directory without overwriting.
    ///
    /// Returns `None` on any failure; a partially written file is removed.
    #[instrument(skip(self))]
    pub async fn download(&self, url: &str, hint: &str) -> Option<PdfAsset> {
        if let Err(e) = tokio::fs::create_dir_all(&self.dest_dir).await {
            warn!(dir = %self.dest_dir.display(), error = %e, "Cannot create PDF directory");
            return None;
        }

        let request = match self.client.get(url) {
            Ok(r) => r.header(ACCEPT, "*/*").timeout(DOWNLOAD_TIMEOUT),
            Err(e) => {
                warn!(url, error = %e, "PDF download blocked");
                return None;
            }
        };
        let resp = match self.client.send(request).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url, error = %e, "PDF download error");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(url, status = %resp.status(), "PDF request unsuccessful");
            return None;
        }

        let path = unique_path(&self.dest_dir, &self.file_name(url, hint));
        match stream_to_file(resp, &path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes, "PDF saved");
                Some(PdfAsset { url: url.to_string(), path })
            }
            Err(e) => {
                warn!(url, error = %e, "PDF download interrupted");
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }
}

async fn stream_to_file(resp: Response, path: &Path) -> Result<u64> {
    let file = tokio::fs::File::create(path).await?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}

fn url_basename(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|s| s.last().map(String::from)))
        .unwrap_or_default()
}

// ── End to end ────────────────────────────────────────────────────────────────

/// Metadata → handle → scraped links → downloaded files.
pub struct PdfFetcher {
    resolver: HandleResolver,
    scraper: PdfLinkScraper,
    downloader: PdfDownloader,
}

impl PdfFetcher {
    pub fn new(resolver: HandleResolver, scraper: PdfLinkScraper, downloader: PdfDownloader) -> Self {
        Self { resolver, scraper, downloader }
    }

    pub async fn fetch_for_item(&self, meta: &ItemMetadata, title_hint: &str) -> Vec<PdfAsset> {
        let Some(handle) = self.resolver.resolve(meta) else {
            debug!("No handle in metadata");
            return Vec::new();
        };
        let urls = self.scraper.scrape(&handle).await;
        if urls.is_empty() {
            return Vec::new();
        }

        let mut assets = Vec::with_capacity(urls.len());
        for url in &urls {
            if let Some(asset) = self.downloader.download(url, title_hint).await {
                assets.push(asset);
            }
        }
        info!(%handle, found = urls.len(), saved = assets.len(), "Bitstreams processed");
        assets
    }
}
