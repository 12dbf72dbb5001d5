//! Clients for the repository and the external abstract services.

pub mod crossref;
pub mod doi;
pub mod repositum;
pub mod springer;

use async_trait::async_trait;

/// Common interface for services that can look up an abstract by DOI.
#[async_trait]
pub trait AbstractSource: Send + Sync {
    /// Short name used in logs and stage reports.
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the service answered but had no abstract.
    async fn fetch_abstract(&self, doi: &str) -> anyhow::Result<Option<String>>;
}

/// `Some(text)` if `text` has non-whitespace content.
pub(crate) fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
