//! CSV output.
//!
//! Rows are comma-separated with a header line and no index column. Quotes
//! and backslashes inside fields are backslash-escaped; quotes are never
//! doubled.

use std::borrow::Cow;
use std::path::Path;

use repositum_common::{HarvestError, Result};
use serde::Serialize;
use tracing::info;

use crate::models::PublicationRecord;

/// A row type with a fixed column order.
///
/// `COLUMNS` must list the serialized field names in declaration order; the
/// header is written from it so an empty dataset still gets one.
pub trait Tabular: Serialize {
    const COLUMNS: &'static [&'static str];
}

impl Tabular for PublicationRecord {
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
    ];
}

fn builder() -> csv::WriterBuilder {
    let mut b = csv::WriterBuilder::new();
    b.has_headers(false).double_quote(false).escape(b'\\');
    b
}

/// Double every `\`; the writer escapes quotes with it but never itself.
fn escape_backslashes(s: &str) -> Cow<'_, str> {
    if s.contains('\\') {
        Cow::Owned(s.replace('\\', "\\\\"))
    } else {
        Cow::Borrowed(s)
    }
}

/// Render one row as fields in `T::COLUMNS` order.
fn record<T: Tabular>(row: &T) -> Result<Vec<String>> {
    let value = serde_json::to_value(row)?;
    T::COLUMNS
        .iter()
        .map(|&col| match value.get(col) {
            Some(serde_json::Value::String(s)) => Ok(escape_backslashes(s).into_owned()),
            Some(serde_json::Value::Null) => Ok(String::new()),
            Some(other) => Ok(other.to_string()),
            None => Err(HarvestError::Other(anyhow::anyhow!("row has no field for column {col:?}"))),
        })
        .collect()
}

/// Write `rows` to any sink. Returns the number of data rows written.
pub fn write_rows<T: Tabular, W: std::io::Write>(sink: W, rows: &[T]) -> Result<usize> {
    let mut wtr = builder().from_writer(sink);
    wtr.write_record(T::COLUMNS)?;
    for row in rows {
        wtr.write_record(record(row)?)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

/// Write `rows` to `path`, creating parent directories as needed.
pub fn write_csv<T: Tabular>(path: &Path, rows: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let n = write_rows(file, rows)?;
    info!(path = %path.display(), rows = n, "Wrote CSV");
    Ok(n)
}
