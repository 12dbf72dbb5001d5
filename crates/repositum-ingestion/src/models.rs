//! Data models for the harvest pipeline.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use repositum_common::{HarvestError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Metadata keys ─────────────────────────────────────────────────────────────

pub const KEY_ORGUNIT:        &str = "tuw.publication.orgunit";
pub const KEY_TITLE:          &str = "dc.title";
pub const KEY_TYPE:           &str = "dc.type";
pub const KEY_QUALIFICATION:  &str = "dc.type.qualificationlevel";
pub const KEY_DATE_ISSUED:    &str = "dc.date.issued";
pub const KEY_AUTHOR:         &str = "dc.contributor.author";
pub const KEY_ABSTRACT:       &str = "dc.description.abstract";
pub const KEY_DOI:            &str = "tuw.publisher.doi";
pub const KEY_PUBLISHER:      &str = "tuw.relation.publisher";
pub const KEY_IDENTIFIER_URI: &str = "dc.identifier.uri";
pub const KEY_IDENTIFIER:     &str = "dc.identifier";

/// Orgunit codes are the first four characters of the full unit value.
const ORGUNIT_CODE_LEN: usize = 4;

/// One `{key, value, language?}` triple from the repository API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataField {
    pub key: String,
    pub value: String,
    pub language: Option<String>,
}

impl MetadataField {
    pub fn new(key: &str, value: &str, language: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            language: language.map(String::from),
        }
    }

    /// Parse one entry of an item's `metadata` array.
    pub fn from_json(v: &serde_json::Value) -> Result<Self> {
        let key = v["key"]
            .as_str()
            .ok_or_else(|| HarvestError::Item(format!("metadata entry without key: {v}")))?;
        let value = match v.get("value") {
            None => return Err(HarvestError::Item(format!("metadata entry {key:?} without value"))),
            Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        let language = v["language"].as_str().map(String::from);
        Ok(Self { key: key.to_string(), value, language })
    }
}

/// Which repository listing a query harvests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationKind {
    Publication,
    Thesis,
    Other,
}

impl PublicationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationKind::Publication => "publication",
            PublicationKind::Thesis      => "thesis",
            PublicationKind::Other       => "other",
        }
    }
}

/// An item's metadata folded into key → ordered values.
///
/// Source order is kept both per key and across keys, since handle
/// resolution breaks ties by field order.
#[derive(Debug, Clone, Default)]
pub struct ItemMetadata {
    fields: Vec<MetadataField>,
    by_key: HashMap<String, Vec<usize>>,
}

impl ItemMetadata {
    pub fn from_fields(fields: Vec<MetadataField>) -> Self {
        let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, f) in fields.iter().enumerate() {
            by_key.entry(f.key.clone()).or_default().push(i);
        }
        Self { fields, by_key }
    }

    /// Build from one element of the REST `items` array.
    pub fn from_item(item: &serde_json::Value) -> Result<Self> {
        let raw = item["metadata"]
            .as_array()
            .ok_or_else(|| HarvestError::Item("item has no metadata array".to_string()))?;
        let fields = raw
            .iter()
            .map(MetadataField::from_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_fields(fields))
    }

    pub fn fields(&self) -> &[MetadataField] {
        &self.fields
    }

    pub fn values<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a MetadataField> + 'a {
        self.by_key
            .get(key)
            .map(|idx| idx.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &self.fields[i])
    }

    fn values_in<'a>(&'a self, key: &str, lang: &'a str) -> impl Iterator<Item = &'a MetadataField> + 'a {
        self.values(key)
            .filter(move |f| f.language.as_deref() == Some(lang))
    }

    fn concat(&self, key: &str) -> String {
        self.values(key).map(|f| f.value.as_str()).collect()
    }

    fn concat_in(&self, key: &str, lang: &str) -> String {
        self.values_in(key, lang).map(|f| f.value.as_str()).collect()
    }

    // ── Column accessors ─────────────────────────────────────────────────────

    /// Distinct 4-character unit codes, sorted, `;`-joined.
    pub fn orgunit(&self) -> String {
        let codes: BTreeSet<String> = self
            .values(KEY_ORGUNIT)
            .map(|f| f.value.chars().take(ORGUNIT_CODE_LEN).collect::<String>())
            .collect();
        codes.into_iter().collect::<Vec<_>>().join(";")
    }

    pub fn title(&self) -> String {
        self.concat(KEY_TITLE)
    }

    pub fn pub_type(&self, kind: PublicationKind) -> String {
        match kind {
            PublicationKind::Thesis => self.concat(KEY_QUALIFICATION),
            PublicationKind::Publication => {
                let types: BTreeSet<&str> = self
                    .values_in(KEY_TYPE, "en")
                    .map(|f| f.value.as_str())
                    .collect();
                types.into_iter().collect()
            }
            PublicationKind::Other => String::new(),
        }
    }

    pub fn date_issued(&self) -> String {
        self.concat(KEY_DATE_ISSUED)
    }

    pub fn authors(&self) -> String {
        self.values(KEY_AUTHOR)
            .map(|f| f.value.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn doi(&self) -> String {
        self.concat(KEY_DOI)
    }

    pub fn publisher(&self) -> String {
        self.concat(KEY_PUBLISHER)
    }

    pub fn abstract_en(&self) -> String {
        self.concat_in(KEY_ABSTRACT, "en")
    }

    pub fn abstract_de(&self) -> String {
        self.concat_in(KEY_ABSTRACT, "de")
    }
}

/// A downloaded bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfAsset {
    pub url: String,
    pub path: PathBuf,
}

/// One row of the output dataset. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
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
}

impl PublicationRecord {
    pub fn from_metadata(meta: &ItemMetadata, kind: PublicationKind, pdfs: &[PdfAsset]) -> Self {
        let pdf_paths: Vec<String> = pdfs.iter().map(|p| p.path.display().to_string()).collect();
        Self {
            orgunit:     meta.orgunit(),
            title:       meta.title(),
            pub_type:    meta.pub_type(kind),
            date_issued: meta.date_issued(),
            authors:     meta.authors(),
            doi:         meta.doi(),
            publisher:   meta.publisher(),
            abstract_en: meta.abstract_en(),
            abstract_de: meta.abstract_de(),
            pdf_count:   pdf_paths.len(),
            pdf_paths,
        }
    }
}

pub(crate) fn join_paths<S: Serializer>(paths: &[String], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&paths.join(";"))
}

pub(crate) fn split_paths<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
    let raw = String::deserialize(d)?;
    Ok(raw.split(';').filter(|p| !p.is_empty()).map(String::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ItemMetadata {
        ItemMetadata::from_fields(vec![
            MetadataField::new(KEY_ORGUNIT, "E194-01 - Research Unit", None),
            MetadataField::new(KEY_ORGUNIT, "E194-02 - Other Unit", None),
            MetadataField::new(KEY_ORGUNIT, "E057 - Service", None),
            MetadataField::new(KEY_TITLE, "Graph Rewriting", None),
            MetadataField::new(KEY_TYPE, "Article", Some("en")),
            MetadataField::new(KEY_TYPE, "Artikel", Some("de")),
            MetadataField::new(KEY_TYPE, "Article", Some("en")),
            MetadataField::new(KEY_DATE_ISSUED, "2021-03", None),
            MetadataField::new(KEY_AUTHOR, "Doe, Jane", None),
            MetadataField::new(KEY_AUTHOR, "Roe, Rick", None),
            MetadataField::new(KEY_ABSTRACT, "An abstract.", Some("en")),
            MetadataField::new(KEY_ABSTRACT, "Eine Zusammenfassung.", Some("de")),
            MetadataField::new(KEY_DOI, "10.1000/xyz", None),
            MetadataField::new(KEY_PUBLISHER, "Springer", None),
        ])
    }

    #[test]
    fn test_column_selection_rules() {
        let m = sample();
        assert_eq!(m.orgunit(), "E057;E194");
        assert_eq!(m.title(), "Graph Rewriting");
        assert_eq!(m.pub_type(PublicationKind::Publication), "Article");
        assert_eq!(m.pub_type(PublicationKind::Thesis), "");
        assert_eq!(m.pub_type(PublicationKind::Other), "");
        assert_eq!(m.authors(), "Doe, Jane,Roe, Rick");
        assert_eq!(m.abstract_en(), "An abstract.");
        assert_eq!(m.abstract_de(), "Eine Zusammenfassung.");
    }

    #[test]
    fn test_thesis_pub_type_uses_qualification_level() {
        let m = ItemMetadata::from_fields(vec![
            MetadataField::new(KEY_QUALIFICATION, "Diploma", None),
            MetadataField::new(KEY_TYPE, "Thesis", Some("en")),
        ]);
        assert_eq!(m.pub_type(PublicationKind::Thesis), "Diploma");
    }

    #[test]
    fn test_record_derivation_is_idempotent() {
        let m = sample();
        let a = PublicationRecord::from_metadata(&m, PublicationKind::Publication, &[]);
        let b = PublicationRecord::from_metadata(&m, PublicationKind::Publication, &[]);
        assert_eq!(a, b);
        assert_eq!(a.pdf_count, 0);
    }

    #[test]
    fn test_from_item_renders_non_string_values() {
        let item = json!({ "metadata": [
            { "key": "dc.title", "value": 42 },
            { "key": "dc.description.abstract", "value": null, "language": "en" },
        ]});
        let m = ItemMetadata::from_item(&item).unwrap();
        assert_eq!(m.title(), "42");
        assert_eq!(m.abstract_en(), "");
    }

    #[test]
    fn test_from_item_rejects_malformed_entries() {
        assert!(ItemMetadata::from_item(&json!({ "name": "no metadata" })).is_err());
        assert!(ItemMetadata::from_item(&json!({ "metadata": [{ "value": "x" }] })).is_err());
        assert!(ItemMetadata::from_item(&json!({ "metadata": [{ "key": "dc.title" }] })).is_err());
    }
}
