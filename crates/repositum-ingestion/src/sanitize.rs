//! Filesystem-safe names for downloaded bitstreams.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

/// Default cap on sanitized names, in characters.
pub const DEFAULT_MAX_LEN: usize = 150;

lazy_static! {
    static ref UNSAFE_RUN: Regex = Regex::new(r"[^\w\-.]+").unwrap();
    static ref UNDERSCORE_RUN: Regex = Regex::new(r"_+").unwrap();
}

/// Map an arbitrary title or URL fragment to a safe file name.
///
/// Runs of characters other than word characters, `-` and `.` become a
/// single `_`; leading and trailing `.`/`_` are dropped. Empty results
/// fall back to `default`, and the result is cut to `max_len` characters.
pub fn safe_filename(raw: &str, max_len: usize, default: &str) -> String {
    let trimmed = raw.trim();
    let source = if trimmed.is_empty() { default } else { trimmed };

    let replaced = UNSAFE_RUN.replace_all(source, "_");
    let collapsed = UNDERSCORE_RUN.replace_all(&replaced, "_");
    let stripped = collapsed.trim_matches(|c: char| c == '.' || c == '_');

    let name = if stripped.is_empty() { default } else { stripped };
    let cut: String = name.chars().take(max_len.max(1)).collect();
    if cut.is_empty() { "file".to_string() } else { cut }
}

/// Force a `.pdf` extension unless the name already carries one.
pub fn with_pdf_extension(name: &str) -> String {
    if name.to_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{name}.pdf")
    }
}

/// First path in `dir` named `name` or `<stem>_<n>.<ext>` (n = 2, 3, …)
/// that does not exist yet.
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    let mut n = 2u32;
    loop {
        let candidate = dir.join(format!("{stem}_{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
