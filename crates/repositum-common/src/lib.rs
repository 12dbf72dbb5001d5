//! repositum-common — Shared HTTP plumbing and error types for the harvester crates.

pub mod error;
pub mod http;

pub use error::{HarvestError, Result};
pub use http::{ClientConfig, HttpClient, RetryPolicy};
