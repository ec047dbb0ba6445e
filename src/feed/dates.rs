//! Locale-tolerant timestamp parsing.
//!
//! Sources report dates as epoch numbers, RFC 3339/2822 strings, compact
//! `YYYYMMDD` digits, Japanese `YYYY年M月D日` text or English long form
//! (`January 29, 2026 8:24 am`).
//! Everything is converted into a single reference timezone. Values without
//! an offset are read as wall-clock time in that timezone.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde_json::Value;

/// Epoch values at or above this are milliseconds (year 5138 in seconds).
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y年%m月%d日 %H:%M:%S",
    "%Y年%m月%d日 %H:%M",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%B %d, %Y"];

/// Parses a raw date value into a timestamp in `tz`.
///
/// Returns `None` for anything unrecognized. Callers must treat `None` as
/// "no timestamp"; substituting the current time would make an unchanged
/// item look freshly published.
pub fn parse_timestamp(value: &Value, tz: FixedOffset) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::Number(n) => {
            let epoch = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            from_epoch(epoch, tz)
        }
        Value::String(s) => parse_str(s.trim(), tz),
        _ => None,
    }
}

fn parse_str(s: &str, tz: FixedOffset) -> Option<DateTime<FixedOffset>> {
    if s.is_empty() {
        return None;
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        if s.len() == 8 {
            return compact_date(s, tz);
        }
        return from_epoch(s.parse().ok()?, tz);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&tz));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&tz));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(dt.with_timezone(&tz));
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return tz.from_local_datetime(&naive).single();
        }
    }
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return tz.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single();
        }
    }

    None
}

/// `YYYYMMDD`, read as local midnight. `s` is known to be eight ASCII digits.
fn compact_date(s: &str, tz: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::from_ymd_opt(
        s[..4].parse().ok()?,
        s[4..6].parse().ok()?,
        s[6..].parse().ok()?,
    )?;
    tz.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single()
}

fn from_epoch(epoch: i64, tz: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let utc = if epoch.abs() >= MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(epoch)?
    } else {
        DateTime::from_timestamp(epoch, 0)?
    };
    Some(utc.with_timezone(&tz))
}

/// Japan Standard Time, the reference timezone unless configured otherwise.
pub fn default_timezone() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Parses an offset like `+09:00`, `-05:30`, `+0900`, `Z` or `UTC`.
pub fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 && rest.is_ascii() => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn ts(value: Value) -> Option<String> {
        parse_timestamp(&value, jst()).map(|dt| dt.to_rfc3339())
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(ts(json!(1_769_990_400)).as_deref(), Some("2026-02-02T09:00:00+09:00"));
    }

    #[test]
    fn test_epoch_millis() {
        assert_eq!(
            ts(json!(1_769_990_400_000_i64)).as_deref(),
            Some("2026-02-02T09:00:00+09:00")
        );
    }

    #[test]
    fn test_epoch_digits_in_string() {
        assert_eq!(ts(json!("1769990400")).as_deref(), Some("2026-02-02T09:00:00+09:00"));
    }

    #[test]
    fn test_rfc3339_converted_to_reference_zone() {
        assert_eq!(
            ts(json!("2026-01-29T14:00:00Z")).as_deref(),
            Some("2026-01-29T23:00:00+09:00")
        );
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(
            ts(json!("Thu, 29 Jan 2026 14:00:00 +0000")).as_deref(),
            Some("2026-01-29T23:00:00+09:00")
        );
    }

    #[test]
    fn test_naive_iso_read_as_local() {
        assert_eq!(
            ts(json!("2026-01-29T08:24:00")).as_deref(),
            Some("2026-01-29T08:24:00+09:00")
        );
        assert_eq!(
            ts(json!("2026-01-29 08:24")).as_deref(),
            Some("2026-01-29T08:24:00+09:00")
        );
    }

    #[test]
    fn test_english_long_form() {
        assert_eq!(
            ts(json!("January 29, 2026 8:24 am")).as_deref(),
            Some("2026-01-29T08:24:00+09:00")
        );
        assert_eq!(
            ts(json!("January 29, 2026 8:24 PM")).as_deref(),
            Some("2026-01-29T20:24:00+09:00")
        );
    }

    #[test]
    fn test_japanese_date() {
        assert_eq!(
            ts(json!("2026年2月2日")).as_deref(),
            Some("2026-02-02T00:00:00+09:00")
        );
        assert_eq!(
            ts(json!("2026年2月2日 18:30")).as_deref(),
            Some("2026-02-02T18:30:00+09:00")
        );
    }

    #[test]
    fn test_compact_date_is_not_epoch() {
        assert_eq!(ts(json!("20260202")).as_deref(), Some("2026-02-02T00:00:00+09:00"));
        assert_eq!(ts(json!("20261399")), None);
        // Nine digits and up are still epoch seconds
        assert_eq!(ts(json!("100000000")).as_deref(), Some("1973-03-03T18:46:40+09:00"));
    }

    #[test]
    fn test_plain_dates() {
        assert_eq!(ts(json!("2026-02-02")).as_deref(), Some("2026-02-02T00:00:00+09:00"));
        assert_eq!(ts(json!("2026/02/02")).as_deref(), Some("2026-02-02T00:00:00+09:00"));
    }

    #[test]
    fn test_unparsable_yields_none() {
        assert_eq!(ts(json!("yesterday")), None);
        assert_eq!(ts(json!("")), None);
        assert_eq!(ts(json!(true)), None);
        assert_eq!(ts(json!({"at": 1})), None);
        assert_eq!(ts(Value::Null), None);
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("+09:00"), Some(jst()));
        assert_eq!(parse_offset("+0900"), Some(jst()));
        assert_eq!(parse_offset("+9"), Some(jst()));
        assert_eq!(
            parse_offset("-05:30"),
            FixedOffset::west_opt(5 * 3600 + 30 * 60)
        );
        assert_eq!(parse_offset("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_offset("Asia/Tokyo"), None);
        assert_eq!(parse_offset("+25:00"), None);
        assert_eq!(parse_offset("+1é1"), None);
        assert_eq!(parse_offset("-é"), None);
    }
}
