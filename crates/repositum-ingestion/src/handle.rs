//! Handle resolution from item metadata.
//!
//! reposiTUm items carry their persistent handle (e.g. `20.500.12708/209747`)
//! in `dc.identifier.uri` / `dc.identifier`, in one of three shapes:
//!
//! - `https://repositum.tuwien.at/handle/20.500.12708/209747`
//! - `http://hdl.handle.net/20.500.12708/209747`
//! - free text containing `20.500.12708/<suffix>`

use tracing::trace;
use url::Url;

use crate::models::{ItemMetadata, KEY_IDENTIFIER, KEY_IDENTIFIER_URI};

pub const DEFAULT_HANDLE_PREFIX:   &str = "20.500.12708";
pub const DEFAULT_REPOSITORY_HOST: &str = "repositum.tuwien.at";
pub const DEFAULT_RESOLVER_HOST:   &str = "hdl.handle.net";

const TRAILING_PUNCTUATION: &[char] = &[')', '.', ',', ';', '"', '\''];

#[derive(Debug, Clone)]
pub struct HandleResolver {
    prefix: String,
    repository_host: String,
    resolver_host: String,
}

impl Default for HandleResolver {
    fn default() -> Self {
        Self::new(DEFAULT_HANDLE_PREFIX, DEFAULT_REPOSITORY_HOST, DEFAULT_RESOLVER_HOST)
    }
}

impl HandleResolver {
    pub fn new(prefix: &str, repository_host: &str, resolver_host: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            repository_host: repository_host.to_string(),
            resolver_host: resolver_host.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// First candidate handle that starts with `<prefix>/`, if any.
    pub fn resolve(&self, meta: &ItemMetadata) -> Option<String> {
        let wanted = format!("{}/", self.prefix);
        self.candidates(meta)
            .into_iter()
            .find(|c| c.starts_with(&wanted))
    }

    /// Every handle-shaped string found in identifier fields, in field order.
    pub fn candidates(&self, meta: &ItemMetadata) -> Vec<String> {
        meta.fields()
            .iter()
            .filter(|f| f.key == KEY_IDENTIFIER_URI || f.key == KEY_IDENTIFIER)
            .filter_map(|f| {
                let v = f.value.trim();
                if v.is_empty() { None } else { self.classify(v) }
            })
            .collect()
    }

    fn classify(&self, v: &str) -> Option<String> {
        let handle_path = format!("{}/handle/", self.repository_host);
        let found = if v.contains(&handle_path) {
            v.split_once("/handle/")
                .map(|(_, rest)| rest.trim().trim_matches('/').to_string())
        } else if v.contains(&self.resolver_host) {
            Url::parse(v)
                .ok()
                .map(|u| u.path().trim_matches('/').to_string())
                .filter(|p| !p.is_empty())
        } else {
            self.embedded(v)
        };
        trace!(value = v, candidate = ?found, "Classified identifier");
        found
    }

    /// `<prefix>/<non-whitespace>` anywhere in `v`, minus trailing punctuation.
    fn embedded(&self, v: &str) -> Option<String> {
        let needle = format!("{}/", self.prefix);
        v.match_indices(&needle).find_map(|(start, _)| {
            let tail = &v[start + needle.len()..];
            let suffix_len = tail.find(char::is_whitespace).unwrap_or(tail.len());
            if suffix_len == 0 {
                return None;
            }
            let raw = &v[start..start + needle.len() + suffix_len];
            Some(raw.trim_end_matches(TRAILING_PUNCTUATION).to_string())
        })
    }
}
