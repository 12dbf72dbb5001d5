//! repositum-ingestion — publication harvesting from reposiTUm.
//!
//! - Paginated orgunit listings over the DSpace REST API
//! - Handle resolution from identifier metadata
//! - PDF link scraping and collision-free downloads
//! - Abstract lookup by DOI (CrossRef, DOI negotiation, Springer)
//! - CSV output and the optional enrichment pass

pub mod abstracts;
pub mod enrich;
pub mod handle;
pub mod harvest;
pub mod models;
pub mod output;
pub mod pdf;
pub mod pipeline;
pub mod sanitize;
pub mod sources;
