use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use super::dates::{default_timezone, parse_timestamp};
use super::item::{
    DropReason, DroppedRecord, NormalizeReport, NormalizedItem, RawItem, RecordWarning, Source,
};
use crate::util::{
    escape_html, first_line, format_amount, normalize_price_text, resolve_link,
    strip_control_chars,
};

const ID_FIELDS: &[&str] = &["id", "sku", "post_id", "guid"];
const LINK_FIELDS: &[&str] = &["link", "url", "href", "canonical_url"];
const TITLE_FIELDS: &[&str] = &["title", "name"];
const DATE_FIELDS: &[&str] = &["published", "published_at", "date", "added", "updated"];
const THUMBNAIL_FIELDS: &[&str] = &["thumbnail", "thumb", "image", "cover", "preview"];
const TRUSTED_HTML_FIELDS: &[&str] = &["description_html", "body_html"];
const SUMMARY_FIELDS: &[&str] = &["summary", "subtitle"];

/// Settings that apply to every record of a run.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Reference timezone all timestamps are converted into.
    pub timezone: FixedOffset,
    /// Base for sources that do not carry their own (normally the channel link).
    pub fallback_base: Option<Url>,
    /// Label of the date line in composed descriptions.
    pub date_label: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            fallback_base: None,
            date_label: "Updated".to_string(),
        }
    }
}

/// Output of [`normalize`]: deduplicated items plus the per-record account.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub items: Vec<NormalizedItem>,
    pub report: NormalizeReport,
}

/// Canonicalizes raw records from all sources into [`NormalizedItem`]s.
///
/// Sources are visited in slice order and records in extractor order; on
/// identity collisions the first record wins and later ones are reported as
/// [`DropReason::Duplicate`], even if their fields differ. A malformed record
/// is dropped with a reason and never aborts the batch.
///
/// Identity priority:
///
/// 1. explicit identifier (`id`, `sku`, `post_id`, `guid`), with the source's `id_prefix`
/// 2. canonical absolute URL of the record's own link
/// 3. SHA-256 of `title|link`, where link falls back to the source base
pub fn normalize(sources: &[Source], options: &NormalizeOptions) -> Normalized {
    let mut seen = HashSet::new();
    let mut out = Normalized::default();

    for source in sources {
        for (index, raw) in source.items.iter().enumerate() {
            let (item, warning) = match normalize_record(raw, source, options) {
                Ok(result) => result,
                Err(reason) => {
                    tracing::warn!(
                        source = %source.name,
                        index = index,
                        reason = %reason,
                        "Dropping record"
                    );
                    out.report.dropped.push(DroppedRecord {
                        source: source.name.clone(),
                        index,
                        reason,
                    });
                    continue;
                }
            };

            if !seen.insert(item.id.clone()) {
                tracing::debug!(source = %source.name, index = index, id = %item.id, "Duplicate record discarded");
                out.report.dropped.push(DroppedRecord {
                    source: source.name.clone(),
                    index,
                    reason: DropReason::Duplicate(item.id),
                });
                continue;
            }

            if let Some(message) = warning {
                tracing::debug!(source = %source.name, index = index, %message, "Record kept with warning");
                out.report.warnings.push(RecordWarning {
                    source: source.name.clone(),
                    index,
                    message,
                });
            }

            out.items.push(item);
        }
    }

    out.report.kept = out.items.len();
    out
}

fn normalize_record(
    raw: &RawItem,
    source: &Source,
    options: &NormalizeOptions,
) -> Result<(NormalizedItem, Option<String>), DropReason> {
    let base = source.base.as_ref().or(options.fallback_base.as_ref());

    let explicit_id = raw
        .text(ID_FIELDS)
        .map(|id| strip_control_chars(&id).into_owned())
        .filter(|id| !id.is_empty());
    let own_link = raw.text(LINK_FIELDS);
    let title = raw
        .text(TITLE_FIELDS)
        .map(|t| first_line(&strip_control_chars(&t)).to_string())
        .filter(|t| !t.is_empty());

    if explicit_id.is_none() && own_link.is_none() && title.is_none() {
        return Err(DropReason::NoIdentity);
    }

    let link = match &own_link {
        Some(href) => resolve_link(href, base)?,
        None => base.cloned().ok_or(DropReason::NoLink)?,
    };

    let id = match (&explicit_id, &own_link, &title) {
        (Some(id), _, _) => match &source.id_prefix {
            Some(prefix) => format!("{prefix}{id}"),
            None => id.clone(),
        },
        (None, Some(_), _) => link.to_string(),
        (None, None, Some(title)) => hash_identity(title, &link),
        (None, None, None) => return Err(DropReason::NoIdentity),
    };

    let mut warning = None;
    let published_at = match raw.value(DATE_FIELDS) {
        Some(value) => {
            let parsed = parse_timestamp(value, options.timezone);
            if parsed.is_none() {
                warning = Some(format!("unparsable date {value}"));
            }
            parsed
        }
        None => None,
    };

    let title = title
        .or(explicit_id)
        .unwrap_or_else(|| last_segment(&link));

    let description_html = match raw.text(TRUSTED_HTML_FIELDS) {
        Some(html) => strip_control_chars(&html).into_owned(),
        None => compose_description(raw, &link, base, published_at, options, &mut warning),
    };

    Ok((
        NormalizedItem {
            id,
            link,
            title,
            published_at,
            description_html,
        },
        warning,
    ))
}

/// Builds an HTML-safe description from the presentation fields:
/// price, thumbnail, summary text and a date line, joined by `<br>`.
fn compose_description(
    raw: &RawItem,
    link: &Url,
    base: Option<&Url>,
    published_at: Option<DateTime<FixedOffset>>,
    options: &NormalizeOptions,
    warning: &mut Option<String>,
) -> String {
    let mut parts = Vec::new();

    if let Some(price) = price_text(raw) {
        parts.push(escape_html(&price).into_owned());
    }

    if let Some(src) = thumbnail_src(raw) {
        match resolve_link(&src, base) {
            Ok(url) => parts.push(format!(r#"<img src="{}">"#, escape_html(url.as_str()))),
            Err(e) => {
                warning.get_or_insert_with(|| format!("thumbnail skipped: {e}"));
            }
        }
    }

    if let Some(summary) = raw.text(SUMMARY_FIELDS) {
        parts.push(escape_html(&strip_control_chars(&summary)).into_owned());
    }

    let date_text = raw
        .text(&["date_text"])
        .map(|text| strip_control_chars(&text).into_owned())
        .or_else(|| published_at.map(|dt| dt.format("%Y-%m-%d %H:%M").to_string()));
    if let Some(date_text) = date_text {
        parts.push(format!(
            "{}: {}",
            escape_html(&options.date_label),
            escape_html(&date_text)
        ));
    }

    if parts.is_empty() {
        escape_html(link.as_str()).into_owned()
    } else {
        parts.join("<br>")
    }
}

fn price_text(raw: &RawItem) -> Option<String> {
    match raw.value(&["price"])? {
        Value::Number(n) => {
            let amount = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            let formatted = format_amount(amount);
            Some(match raw.text(&["currency"]) {
                Some(currency) => format!("{formatted} {currency}"),
                None => formatted,
            })
        }
        Value::String(s) if !s.trim().is_empty() => Some(normalize_price_text(s)),
        _ => None,
    }
}

fn thumbnail_src(raw: &RawItem) -> Option<String> {
    match raw.value(THUMBNAIL_FIELDS)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(obj) => ["url", "path"].iter().find_map(|k| {
            obj.get(*k)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        }),
        _ => None,
    }
}

fn hash_identity(title: &str, link: &Url) -> String {
    let hash = Sha256::digest(format!("{}|{}", title, link).as_bytes());
    format!("{:x}", hash)
}

fn last_segment(link: &Url) -> String {
    link.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| link.to_string())
}
