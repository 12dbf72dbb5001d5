//! Configuration loading for the harvester.
//! Reads repositum.toml from the current directory or the path in REPOSITUM_CONFIG.
//! Every field has a default, so a missing file runs the stock harvest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use repositum_common::{ClientConfig, HarvestError, RetryPolicy};
use repositum_ingestion::abstracts::AbstractEndpoints;
use repositum_ingestion::handle::{DEFAULT_HANDLE_PREFIX, DEFAULT_RESOLVER_HOST};
use repositum_ingestion::harvest::HarvestOptions;
use repositum_ingestion::models::PublicationKind;
use repositum_ingestion::sanitize::DEFAULT_MAX_LEN;
use repositum_ingestion::sources::{crossref, doi, repositum, springer};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default = "default_queries")]
    pub queries: Vec<QueryConfig>,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            queries: default_queries(),
            harvest: HarvestConfig::default(),
            http: HttpConfig::default(),
            output: OutputConfig::default(),
            enrich: EnrichConfig::default(),
        }
    }
}

// ── [repository] ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_orgunit_id")]
    pub orgunit_id: String,
    #[serde(default = "default_handle_prefix")]
    pub handle_prefix: String,
    #[serde(default = "default_resolver_host")]
    pub resolver_host: String,
}

fn default_base_url()      -> String { repositum::DEFAULT_BASE_URL.to_string() }
fn default_orgunit_id()    -> String { "1601".to_string() }
fn default_handle_prefix() -> String { DEFAULT_HANDLE_PREFIX.to_string() }
fn default_resolver_host() -> String { DEFAULT_RESOLVER_HOST.to_string() }

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            orgunit_id: default_orgunit_id(),
            handle_prefix: default_handle_prefix(),
            resolver_host: default_resolver_host(),
        }
    }
}

// ── [[queries]] ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryConfig {
    pub kind: PublicationKind,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_from_year")]
    pub from: u32,
}

fn default_endpoint()  -> String { repositum::PUBLICATIONS_LISTING.to_string() }
fn default_from_year() -> u32 { 2018 }

fn default_queries() -> Vec<QueryConfig> {
    vec![QueryConfig {
        kind: PublicationKind::Publication,
        endpoint: default_endpoint(),
        from: default_from_year(),
    }]
}

// ── [harvest] ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub start_offset: usize,
    /// Absent or 0 means no cap.
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
    #[serde(default = "default_page_retry_delay_ms")]
    pub page_retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub download_pdfs: bool,
}

fn default_item_delay_ms()       -> u64 { 30 }
fn default_page_retry_delay_ms() -> u64 { 2000 }
fn default_true()                -> bool { true }

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            start_offset: 0,
            max_items: None,
            item_delay_ms: default_item_delay_ms(),
            page_retry_delay_ms: default_page_retry_delay_ms(),
            download_pdfs: true,
        }
    }
}

// ── [http] ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_api_user_agent")]
    pub api_user_agent: String,
    #[serde(default = "default_html_user_agent")]
    pub html_user_agent: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
    #[serde(default = "default_html_timeout_secs")]
    pub html_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor_secs")]
    pub backoff_factor_secs: f64,
}

fn default_api_user_agent()      -> String { "repositum-pdf-fetcher/1.1".to_string() }
fn default_html_user_agent()     -> String { "repositum-pdf-scraper/1.1".to_string() }
fn default_connect_timeout_secs() -> u64 { 8 }
fn default_api_timeout_secs()    -> u64 { 30 }
fn default_html_timeout_secs()   -> u64 { 60 }
fn default_max_retries()         -> u32 { 3 }
fn default_backoff_factor_secs() -> f64 { 1.0 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_user_agent: default_api_user_agent(),
            html_user_agent: default_html_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
            api_timeout_secs: default_api_timeout_secs(),
            html_timeout_secs: default_html_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_factor_secs: default_backoff_factor_secs(),
        }
    }
}

// ── [output] ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,
    #[serde(default = "default_pdf_dir")]
    pub pdf_dir: PathBuf,
    #[serde(default = "default_max_filename_len")]
    pub max_filename_len: usize,
}

fn default_csv_path()         -> PathBuf { PathBuf::from("works.csv") }
fn default_pdf_dir()          -> PathBuf { PathBuf::from("pdfs") }
fn default_max_filename_len() -> usize { DEFAULT_MAX_LEN }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            pdf_dir: default_pdf_dir(),
            max_filename_len: default_max_filename_len(),
        }
    }
}

// ── [enrich] ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_enriched_csv_path")]
    pub csv_path: PathBuf,
    #[serde(default = "default_crossref_base")]
    pub crossref_base: String,
    #[serde(default = "default_doi_resolver_base")]
    pub doi_resolver_base: String,
    #[serde(default = "default_springer_base")]
    pub springer_base: String,
}

fn default_enriched_csv_path() -> PathBuf { PathBuf::from("works_enriched.csv") }
fn default_crossref_base()     -> String { crossref::CR_API_BASE.to_string() }
fn default_doi_resolver_base() -> String { doi::DOI_RESOLVER_BASE.to_string() }
fn default_springer_base()     -> String { springer::SPRINGER_BASE.to_string() }

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            csv_path: default_enriched_csv_path(),
            crossref_base: default_crossref_base(),
            doi_resolver_base: default_doi_resolver_base(),
            springer_base: default_springer_base(),
        }
    }
}

impl Config {
    /// Load configuration from repositum.toml.
    /// Checks REPOSITUM_CONFIG env var first, then current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("REPOSITUM_CONFIG")
            .unwrap_or_else(|_| "repositum.toml".to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> repositum_common::Result<()> {
        self.repository_url()?;
        if self.queries.is_empty() {
            return Err(HarvestError::Config("at least one [[queries]] entry is required".into()));
        }
        if self.http.backoff_factor_secs < 0.0 || !self.http.backoff_factor_secs.is_finite() {
            return Err(HarvestError::Config(format!(
                "http.backoff_factor_secs must be a non-negative number, got {}",
                self.http.backoff_factor_secs
            )));
        }
        if self.output.max_filename_len == 0 {
            return Err(HarvestError::Config("output.max_filename_len must be positive".into()));
        }
        if self.enrich.enabled {
            for base in [&self.enrich.crossref_base, &self.enrich.doi_resolver_base, &self.enrich.springer_base] {
                Url::parse(base).map_err(|e| HarvestError::Config(format!("invalid service URL {base:?}: {e}")))?;
            }
        }
        Ok(())
    }

    pub fn repository_url(&self) -> repositum_common::Result<Url> {
        Url::parse(&self.repository.base_url)
            .map_err(|e| HarvestError::Config(format!("invalid repository.base_url {:?}: {e}", self.repository.base_url)))
    }

    /// Hosts outside the built-in allowlist that this configuration talks to.
    pub fn extra_hosts(&self) -> Vec<String> {
        let mut urls = vec![self.repository.base_url.as_str()];
        if self.enrich.enabled {
            urls.extend([
                self.enrich.crossref_base.as_str(),
                self.enrich.doi_resolver_base.as_str(),
                self.enrich.springer_base.as_str(),
            ]);
        }
        let mut hosts: Vec<String> = urls
            .into_iter()
            .filter_map(|u| Url::parse(u).ok()?.host_str().map(String::from))
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::transient(
            self.http.max_retries,
            Duration::from_secs_f64(self.http.backoff_factor_secs),
        )
    }

    pub fn api_client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::api().with_retry(self.retry_policy());
        cfg.user_agent = self.http.api_user_agent.clone();
        cfg.connect_timeout = Duration::from_secs(self.http.connect_timeout_secs);
        cfg.timeout = Duration::from_secs(self.http.api_timeout_secs);
        cfg
    }

    pub fn html_client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::html();
        cfg.user_agent = self.http.html_user_agent.clone();
        cfg.connect_timeout = Duration::from_secs(self.http.connect_timeout_secs);
        cfg.timeout = Duration::from_secs(self.http.html_timeout_secs);
        cfg
    }

    pub fn harvest_options(&self) -> HarvestOptions {
        HarvestOptions {
            start_offset: self.harvest.start_offset,
            max_items: self.harvest.max_items,
            item_delay: Duration::from_millis(self.harvest.item_delay_ms),
            page_retry_delay: Duration::from_millis(self.harvest.page_retry_delay_ms),
        }
    }

    pub fn abstract_endpoints(&self) -> AbstractEndpoints {
        AbstractEndpoints {
            crossref: self.enrich.crossref_base.clone(),
            doi_resolver: self.enrich.doi_resolver_base.clone(),
            springer: self.enrich.springer_base.clone(),
        }
    }
}
