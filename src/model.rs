//! Data model shared by extraction, normalisation, validation, and export.
//!
//! Field names come from configuration, so a [Record] is an ordered string map rather than a struct.
//! A [Target] describes one configured catalog: its list page and which of the two extraction
//! modes applies.

use crate::extract::{Css, SelectorSpec};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Trace field injected into every record: the configured list page URL.
pub const SOURCE_LIST_URL: &str = "source_list_url";
/// Trace field injected into detail-follow records: the absolute URL that was fetched.
pub const DETAIL_URL: &str = "detail_url";
/// Field names ending in this suffix hold URLs and are resolved against the record's base URL.
pub const URL_FIELD_SUFFIX: &str = "_url";

/// True for field names that carry a URL: `url` itself or anything ending in `_url`.
pub fn is_url_field(name: &str) -> bool {
    name == "url" || name.ends_with(URL_FIELD_SUFFIX)
}

/// One extracted item: field name to value, in first-insertion order.
///
/// `None` is a missing value (selector did not match, attribute absent, or empty after trim).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, Option<String>)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. An existing key keeps its position; a new key is appended.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Value of a field; `None` when the key is absent or the value is missing.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Option<String>)> {
        self.fields.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Serialises as a JSON object in field order, missing values as `null`.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Configured fields in configuration order: field name to parsed selector expression.
#[derive(Debug, Clone, Default)]
pub struct FieldSpecs {
    entries: Vec<(String, SelectorSpec)>,
}

impl FieldSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, or replace the spec of an existing one in place.
    pub fn push(&mut self, name: impl Into<String>, spec: SelectorSpec) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = spec,
            None => self.entries.push((name, spec)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SelectorSpec> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SelectorSpec)> {
        self.entries.iter().map(|(n, spec)| (n.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A validated scrape target. Built by the config loader; the pipeline trusts its shape.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub list_url: String,
    pub mode: TargetMode,
}

/// Extraction mode of a target. Exactly one applies.
#[derive(Debug, Clone)]
pub enum TargetMode {
    /// All fields come from repeated item blocks on the list page.
    ListOnly {
        item_selector: Css,
        item_fields: FieldSpecs,
    },
    /// The list page yields links; each linked page is one record.
    DetailFollow {
        link_selector: Css,
        detail_fields: FieldSpecs,
    },
}

impl TargetMode {
    pub fn label(&self) -> &'static str {
        match self {
            TargetMode::ListOnly { .. } => "list-only",
            TargetMode::DetailFollow { .. } => "detail-follow",
        }
    }
}
