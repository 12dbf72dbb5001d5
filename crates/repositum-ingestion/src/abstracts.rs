//! Abstract lookup by DOI across a fixed chain of services.
//!
//! Stages run in order and the first non-empty abstract wins. A stage that
//! fails (transport error, bad status, unparsable body) is recorded and the
//! chain moves on; nothing here returns an error to the caller.

use repositum_common::HttpClient;
use tracing::{debug, info, warn};

use crate::sources::crossref::CrossRefClient;
use crate::sources::doi::DoiNegotiationClient;
use crate::sources::springer::SpringerClient;
use crate::sources::AbstractSource;

/// What one stage of the chain produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Found,
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub source: &'static str,
    pub outcome: StageOutcome,
}

/// Result of running the chain for one DOI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbstractLookup {
    pub abstract_text: Option<String>,
    /// One entry per stage that actually ran, in order.
    pub stages: Vec<StageReport>,
}

/// Base URLs of the three standard stages.
#[derive(Debug, Clone)]
pub struct AbstractEndpoints {
    pub crossref: String,
    pub doi_resolver: String,
    pub springer: String,
}

impl Default for AbstractEndpoints {
    fn default() -> Self {
        Self {
            crossref:     crate::sources::crossref::CR_API_BASE.to_string(),
            doi_resolver: crate::sources::doi::DOI_RESOLVER_BASE.to_string(),
            springer:     crate::sources::springer::SPRINGER_BASE.to_string(),
        }
    }
}

pub struct AbstractFetcher {
    sources: Vec<Box<dyn AbstractSource>>,
}

impl AbstractFetcher {
    pub fn new(sources: Vec<Box<dyn AbstractSource>>) -> Self {
        Self { sources }
    }

    /// CrossRef → DOI content negotiation → Springer page.
    pub fn standard(api: HttpClient, html: HttpClient, endpoints: &AbstractEndpoints) -> Self {
        Self::new(vec![
            Box::new(CrossRefClient::new(api.clone()).with_base_url(&endpoints.crossref)),
            Box::new(DoiNegotiationClient::new(api).with_base_url(&endpoints.doi_resolver)),
            Box::new(SpringerClient::new(html).with_base_url(&endpoints.springer)),
        ])
    }

    pub async fn fetch(&self, doi: Option<&str>) -> AbstractLookup {
        let doi = doi.map(str::trim).unwrap_or("");
        if doi.is_empty() {
            return AbstractLookup::default();
        }
        debug!(doi, "Fetching abstract");

        let mut lookup = AbstractLookup::default();
        for source in &self.sources {
            let outcome = match source.fetch_abstract(doi).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    info!(doi, source = source.name(), "Abstract found");
                    lookup.abstract_text = Some(text);
                    StageOutcome::Found
                }
                Ok(_) => {
                    debug!(doi, source = source.name(), "No abstract");
                    StageOutcome::NotFound
                }
                Err(e) => {
                    warn!(doi, source = source.name(), error = %e, "Abstract lookup failed");
                    StageOutcome::Failed(e.to_string())
                }
            };
            lookup.stages.push(StageReport { source: source.name(), outcome });
            if lookup.abstract_text.is_some() {
                break;
            }
        }
        lookup
    }
}
