//! Post-harvest enrichment: a single `abstract` column and a publication year.
//!
//! Rows whose repository metadata carries no abstract get one more chance
//! through the [`AbstractFetcher`] chain when they have a DOI.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::abstracts::AbstractFetcher;
use crate::models::{join_paths, split_paths, PublicationRecord};
use crate::output::Tabular;

lazy_static! {
    static ref YEAR: Regex = Regex::new(r"\d{4}").unwrap();
}

/// A [`PublicationRecord`] followed by the derived `abstract` and `year`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub orgunit: String,
    pub title: String,
    pub pub_type: String,
    pub date_issued: String,
    pub authors: String,
    pub doi: String,
    pub publisher: String,
    pub abstract_en: String,
    pub abstract_de: String,
    #[serde(serialize_with = "join_paths", deserialize_with = "split_paths")]
    pub pdf_paths: Vec<String>,
    pub pdf_count: usize,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub year: String,
}

impl Tabular for EnrichedRecord {
    const COLUMNS: &'static [&'static str] = &[
        "orgunit",
        "title",
        "pub_type",
        "date_issued",
        "authors",
        "doi",
        "publisher",
        "abstract_en",
        "abstract_de",
        "pdf_paths",
        "pdf_count",
        "abstract",
        "year",
    ];
}

impl From<&PublicationRecord> for EnrichedRecord {
    fn from(r: &PublicationRecord) -> Self {
        Self {
            abstract_text: preferred_abstract(r),
            year: year_of(&r.date_issued),
            orgunit: r.orgunit.clone(),
            title: r.title.clone(),
            pub_type: r.pub_type.clone(),
            date_issued: r.date_issued.clone(),
            authors: r.authors.clone(),
            doi: r.doi.clone(),
            publisher: r.publisher.clone(),
            abstract_en: r.abstract_en.clone(),
            abstract_de: r.abstract_de.clone(),
            pdf_paths: r.pdf_paths.clone(),
            pdf_count: r.pdf_count,
        }
    }
}

/// English abstract, else German, else empty. Only an empty string counts
/// as missing.
pub fn preferred_abstract(r: &PublicationRecord) -> String {
    [&r.abstract_en, &r.abstract_de]
        .into_iter()
        .find(|a| !a.is_empty())
        .cloned()
        .unwrap_or_default()
}

/// First run of four digits in an issue date (`"2021-03-01"` → `"2021"`).
pub fn year_of(date_issued: &str) -> String {
    YEAR.find(date_issued).map(|m| m.as_str().to_string()).unwrap_or_default()
}

/// Derive enriched rows, filling missing abstracts through `fetcher` when given.
pub async fn enrich(records: &[PublicationRecord], fetcher: Option<&AbstractFetcher>) -> Vec<EnrichedRecord> {
    let mut out = Vec::with_capacity(records.len());
    let mut filled = 0usize;

    for record in records {
        let mut row = EnrichedRecord::from(record);
        if let Some(fetcher) = fetcher {
            if row.abstract_text.is_empty() && !row.doi.trim().is_empty() {
                let lookup = fetcher.fetch(Some(&row.doi)).await;
                if let Some(text) = lookup.abstract_text {
                    row.abstract_text = text;
                    filled += 1;
                } else {
                    debug!(doi = %row.doi, stages = lookup.stages.len(), "No abstract from any source");
                }
            }
        }
        out.push(row);
    }

    info!(rows = out.len(), filled, "Enrichment complete");
    out
}
