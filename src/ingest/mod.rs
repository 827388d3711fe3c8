// src/ingest/mod.rs
pub mod fetcher;
pub mod providers;
pub mod types;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::ingest::types::Candidate;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Decode HTML entities, strip tags, normalize curly quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();
    let stripped = RE_TAGS.replace_all(&decoded, "");
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    RE_WS.replace_all(&quoted, " ").trim().to_string()
}

fn first_str<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Parse the date shapes feeds actually send and render them as ISO-8601 UTC (millis).
pub fn normalize_date(raw: &Value) -> Option<String> {
    let dt: DateTime<Utc> = match raw {
        Value::Number(n) => {
            let secs = n.as_i64()?;
            Utc.timestamp_opt(secs, 0).single()?
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                dt.with_timezone(&Utc)
            } else if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
                dt.with_timezone(&Utc)
            } else if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                naive.and_utc()
            } else if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                naive.and_utc()
            } else if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                day.and_hms_opt(0, 0, 0)?.and_utc()
            } else if let Ok(secs) = s.parse::<i64>() {
                Utc.timestamp_opt(secs, 0).single()?
            } else {
                return None;
            }
        }
        _ => return None,
    };
    Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn tickers_of(item: &Value) -> Vec<String> {
    let raw = item
        .get("symbols")
        .filter(|v| !v.is_null())
        .or_else(|| item.get("tickers"));
    let mut out: Vec<String> = match raw {
        Some(Value::Array(xs)) => xs
            .iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(o) => o
                    .get("symbol")
                    .or_else(|| o.get("ticker"))
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|t| t.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    let mut seen = std::collections::HashSet::new();
    out.retain(|t| !t.is_empty() && seen.insert(t.clone()));
    out
}

/// Adapter from a raw feed item to a `Candidate`. The only place that knows about
/// the feed's field aliases (`title`/`headline`, `content`/`summary`, `link`/`url`, ...).
pub fn candidate_from_feed_item(item: &Value) -> Candidate {
    let title = first_str(item, &["title", "headline"])
        .map(clean_text)
        .unwrap_or_default();
    let content = first_str(item, &["content", "summary", "description"])
        .map(clean_text)
        .unwrap_or_default();
    let link = first_str(item, &["link", "url"]).map(str::to_string);
    let published_at = ["date", "published_at", "time"]
        .iter()
        .filter_map(|k| item.get(*k))
        .find(|v| !v.is_null())
        .and_then(normalize_date);

    Candidate {
        title,
        content,
        published_at,
        link,
        tickers: tickers_of(item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_text_decodes_and_collapses() {
        assert_eq!(
            clean_text("  <b>Fed&nbsp;&nbsp;holds</b>\n rates &ldquo;steady&rdquo;  "),
            r#"Fed holds rates "steady""#
        );
    }

    #[test]
    fn adapter_resolves_aliases() {
        let item = json!({
            "headline": "Apple beats",
            "summary": "Revenue up",
            "url": "https://news.test/a",
            "published_at": "2024-05-02 13:45:00",
            "tickers": ["AAPL", " ", "AAPL"]
        });
        let c = candidate_from_feed_item(&item);
        assert_eq!(c.title, "Apple beats");
        assert_eq!(c.content, "Revenue up");
        assert_eq!(c.link.as_deref(), Some("https://news.test/a"));
        assert_eq!(c.published_at.as_deref(), Some("2024-05-02T13:45:00.000Z"));
        assert_eq!(c.tickers, vec!["AAPL".to_string()]);
    }

    #[test]
    fn adapter_prefers_primary_fields_and_tolerates_gaps() {
        let item = json!({
            "title": "Primary",
            "headline": "Secondary",
            "symbols": "MSFT, NVDA",
            "date": "not a date"
        });
        let c = candidate_from_feed_item(&item);
        assert_eq!(c.title, "Primary");
        assert!(c.content.is_empty());
        assert!(c.link.is_none());
        assert!(c.published_at.is_none());
        assert_eq!(c.tickers, vec!["MSFT".to_string(), "NVDA".to_string()]);
    }

    #[test]
    fn dates_normalize_to_utc_millis() {
        assert_eq!(
            normalize_date(&json!("2024-01-15T09:30:00-05:00")).as_deref(),
            Some("2024-01-15T14:30:00.000Z")
        );
        assert_eq!(
            normalize_date(&json!("2024-01-15")).as_deref(),
            Some("2024-01-15T00:00:00.000Z")
        );
        assert_eq!(
            normalize_date(&json!(0)).as_deref(),
            Some("1970-01-01T00:00:00.000Z")
        );
    }
}
