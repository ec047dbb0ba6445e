use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::util::LinkError;

/// An unnormalized record as produced by an extractor.
///
/// This is an opaque attribute mapping: extractors put whatever they scraped
/// under the field names the normalizer understands (`id`, `sku`, `link`,
/// `title`, `published`, `thumbnail`, `price`, ...) and the normalizer decides
/// what survives. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem(Map<String, Value>);

impl RawItem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for extractors and tests.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First of `keys` holding a non-blank string (or a number, rendered as text).
    pub(crate) fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match self.0.get(*k)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// First of `keys` that is present and not null.
    pub(crate) fn value(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .find_map(|k| self.0.get(*k).filter(|v| !v.is_null()))
    }
}

impl From<Map<String, Value>> for RawItem {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One extractor's output for a run, in the order the extractor produced it.
///
/// Position in the `sources` slice handed to the pipeline is the merge
/// precedence: on duplicate identities the earlier source wins.
#[derive(Debug, Clone, Default)]
pub struct Source {
    /// Human-readable name, used in logs and drop reports.
    pub name: String,
    /// Base URL for relative links and thumbnails. Falls back to the channel link.
    pub base: Option<Url>,
    /// Prepended to explicit identifiers so ids from distinct sources cannot collide.
    pub id_prefix: Option<String>,
    pub items: Vec<RawItem>,
}

impl Source {
    pub fn new(name: impl Into<String>, items: Vec<RawItem>) -> Self {
        Self {
            name: name.into(),
            base: None,
            id_prefix: None,
            items,
        }
    }

    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }
}

/// Canonical item record used inside the pipeline.
///
/// `id` is non-empty and unique within a run; `link` is always absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
    pub id: String,
    pub link: Url,
    pub title: String,
    /// Resolved timestamp in the reference timezone. `None` means the source
    /// gave no usable date; it is never filled with "now".
    pub published_at: Option<DateTime<FixedOffset>>,
    /// HTML-safe description body.
    pub description_html: String,
}

/// A normalized item at its final presentation position.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedItem {
    pub position: usize,
    pub item: NormalizedItem,
}

impl OrderedItem {
    pub fn id(&self) -> &str {
        &self.item.id
    }
}

/// Why the normalizer discarded a raw record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    /// No explicit id, no link and no title: nothing to derive an identity from.
    #[error("no identifier, link or title to derive an identity from")]
    NoIdentity,
    /// No link of its own and no base URL to fall back to.
    #[error("no link and no base URL to fall back to")]
    NoLink,
    /// The record had a link but it could not be made absolute.
    #[error("unusable link: {0}")]
    Link(#[from] LinkError),
    /// An earlier record (in source order) already claimed this identity.
    #[error("duplicate of an earlier record with id {0:?}")]
    Duplicate(String),
}

/// A dropped record, located by source name and index within that source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRecord {
    pub source: String,
    pub index: usize,
    pub reason: DropReason,
}

/// A kept record that lost some optional information along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWarning {
    pub source: String,
    pub index: usize,
    pub message: String,
}

/// Per-run account of what the normalizer kept and discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    pub kept: usize,
    pub dropped: Vec<DroppedRecord>,
    pub warnings: Vec<RecordWarning>,
}

impl NormalizeReport {
    pub fn duplicates(&self) -> usize {
        self.dropped
            .iter()
            .filter(|d| matches!(d.reason, DropReason::Duplicate(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_prefers_first_non_blank_key() {
        let raw = RawItem::new().with("id", "  ").with("sku", "1183A");
        assert_eq!(raw.text(&["id", "sku"]).as_deref(), Some("1183A"));
    }

    #[test]
    fn test_text_renders_numbers() {
        let raw = RawItem::new().with("post_id", 42);
        assert_eq!(raw.text(&["id", "post_id"]).as_deref(), Some("42"));
    }

    #[test]
    fn test_text_ignores_non_scalar_values() {
        let raw = RawItem::new().with("id", json!({"nested": 1}));
        assert!(raw.text(&["id"]).is_none());
    }

    #[test]
    fn test_value_skips_null() {
        let raw = RawItem::new()
            .with("published", Value::Null)
            .with("added", "2026-01-01");
        assert_eq!(raw.value(&["published", "added"]), Some(&json!("2026-01-01")));
    }

    #[test]
    fn test_raw_item_deserializes_from_object() {
        let raw: RawItem = serde_json::from_value(json!({"id": "x", "title": "T"})).unwrap();
        assert_eq!(raw.get("title"), Some(&json!("T")));
    }

    #[test]
    fn test_report_counts_duplicates() {
        let report = NormalizeReport {
            kept: 1,
            dropped: vec![
                DroppedRecord {
                    source: "a".into(),
                    index: 1,
                    reason: DropReason::Duplicate("x".into()),
                },
                DroppedRecord {
                    source: "a".into(),
                    index: 2,
                    reason: DropReason::NoIdentity,
                },
            ],
            warnings: Vec::new(),
        };
        assert_eq!(report.duplicates(), 1);
    }
}
