//! Tolerant parsers for loosely structured sheet cells.
//!
//! Every function here returns an empty or default value on malformed input.
//! Callers never see a parse error from an auxiliary field.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tracing::debug;

use crate::model::{CampaignMeta, Metric};

/// Days reported for a missing or unreadable date; always outside any window.
pub const UNKNOWN_AGE_DAYS: i64 = 9999;

const LIST_SEPARATORS: &[char] = &['\n', ';', '|', '｜', '、', '，', ','];

/// Parses `¥12,345.6`, `5.03%`, ` 1 200 ` and friends. The percent sign is
/// dropped without scaling.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|&character| !matches!(character, '¥' | '￥' | ',' | ' '))
        .collect::<String>();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Like [`parse_number`] but converts `5%` into `0.05` for ratio metrics.
pub fn parse_metric_number(metric: Metric, raw: &str) -> Option<f64> {
    let value = parse_number(raw)?;
    if metric.is_ratio() && raw.trim().ends_with('%') {
        return Some(value / 100.0);
    }
    Some(value)
}

/// Ratio cell without a metric context: percent strings become fractions.
pub fn parse_ratio(raw: &str) -> Option<f64> {
    parse_metric_number(Metric::Ctr, raw)
}

pub fn parse_count(raw: &str) -> f64 {
    parse_number(raw).unwrap_or(0.0)
}

pub fn parse_meta(raw: &str) -> CampaignMeta {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CampaignMeta::default();
    }
    match serde_json::from_str::<CampaignMeta>(trimmed) {
        Ok(meta) => meta,
        Err(error) => {
            debug!(error = %error, "campaign meta unreadable, using neutral default");
            CampaignMeta::default()
        }
    }
}

/// Numeric entries of an `{"CPA": -0.2, "CV": "0.1"}` style object.
pub fn parse_effect(raw: &str) -> BTreeMap<String, f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return BTreeMap::new();
    }

    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) else {
        debug!("outcome effect unreadable, using neutral default");
        return BTreeMap::new();
    };

    map.into_iter()
        .filter_map(|(key, value)| {
            let number = match value {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => parse_number(&text),
                _ => None,
            }?;
            Some((key, number))
        })
        .collect()
}

/// Accepts JSON arrays, single-quoted arrays, and separator-delimited text.
pub fn parse_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Some(items) = parse_json_list(trimmed) {
        return items;
    }
    if trimmed.starts_with('[') && trimmed.contains('\'') {
        if let Some(items) = parse_json_list(&trimmed.replace('\'', "\"")) {
            return items;
        }
    }

    let body = trimmed
        .strip_prefix('[')
        .and_then(|value| value.strip_suffix(']'))
        .unwrap_or(trimmed);

    body.split(LIST_SEPARATORS)
        .map(|item| item.trim().trim_matches(|c: char| c == '"' || c == '\'').trim())
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_json_list(candidate: &str) -> Option<Vec<String>> {
    let values = serde_json::from_str::<Vec<Value>>(candidate).ok()?;
    Some(
        values
            .into_iter()
            .map(|value| match value {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .filter(|item| !item.trim().is_empty())
            .collect(),
    )
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let dashed = trimmed.replace('/', "-");
    if let Ok(date) = NaiveDate::parse_from_str(&dashed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(timestamp.date_naive());
    }
    dashed
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

pub fn age_in_days(date: Option<NaiveDate>, today: NaiveDate) -> i64 {
    date.map(|value| (today - value).num_days())
        .unwrap_or(UNKNOWN_AGE_DAYS)
}

pub fn unescape_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_strips_currency_grouping_and_percent() {
        assert_eq!(parse_number("¥12,345"), Some(12345.0));
        assert_eq!(parse_number("￥ 1 200.5"), Some(1200.5));
        assert_eq!(parse_number("5.03%"), Some(5.03));
        assert_eq!(parse_number("—"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn parse_metric_number_scales_percent_only_for_ratios() {
        assert_eq!(parse_metric_number(Metric::Ctr, "3%"), Some(0.03));
        assert_eq!(parse_metric_number(Metric::Cvr, "0.02"), Some(0.02));
        assert_eq!(parse_metric_number(Metric::Cpa, "20%"), Some(20.0));
    }

    #[test]
    fn parse_meta_degrades_to_default_on_garbage() {
        assert_eq!(
            parse_meta(r#"{"channel":"search","brand":"non"}"#),
            CampaignMeta::new("search", "non")
        );
        assert_eq!(parse_meta("{channel: search"), CampaignMeta::default());
        assert_eq!(parse_meta(r#"{"channel": 7}"#), CampaignMeta::default());
    }

    #[test]
    fn parse_effect_keeps_numeric_entries_only() {
        let effect = parse_effect(r#"{"CPA": -0.2, "CV": "0.1", "note": "x"}"#);
        assert_eq!(effect.len(), 2);
        assert_eq!(effect.get("CPA"), Some(&-0.2));
        assert_eq!(effect.get("CV"), Some(&0.1));
        assert!(parse_effect("[1,2]").is_empty());
        assert!(parse_effect("not json").is_empty());
    }

    #[test]
    fn parse_list_handles_json_quotes_and_separators() {
        assert_eq!(parse_list(r#"["a","b"]"#), vec!["a", "b"]);
        assert_eq!(parse_list("['a', 'b']"), vec!["a", "b"]);
        assert_eq!(parse_list("a;b｜c"), vec!["a", "b", "c"]);
        assert_eq!(parse_list("一、二\n三"), vec!["一", "二", "三"]);
        assert!(parse_list("  ").is_empty());
    }

    #[test]
    fn parse_date_accepts_slashes_and_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2025, 9, 15);
        assert_eq!(parse_date("2025-09-15"), expected);
        assert_eq!(parse_date("2025/09/15"), expected);
        assert_eq!(parse_date("2025-09-15T10:00:00+09:00"), expected);
        assert_eq!(parse_date("2025-09-15 10:00"), expected);
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn age_in_days_treats_missing_dates_as_stale() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 1).expect("date");
        assert_eq!(age_in_days(None, today), UNKNOWN_AGE_DAYS);
        assert_eq!(age_in_days(NaiveDate::from_ymd_opt(2025, 9, 1), today), 30);
    }
}
