use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use super::headings::{BULLET_PREFIX, Section};
use crate::model::MetricRow;

/// Rendered in place of a CPA when there were no conversions.
pub const UNKNOWN_MARKER: &str = "—";

const MAX_BARE_TOKEN_CHARS: usize = 8;

/// Authoritative results section, rendered locally and never by the generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsBlock {
    pub heading: String,
    pub body: Vec<String>,
}

impl ResultsBlock {
    pub fn text(&self) -> String {
        let mut lines = Vec::with_capacity(self.body.len() + 1);
        lines.push(self.heading.as_str());
        lines.extend(self.body.iter().map(String::as_str));
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy)]
struct Figures {
    cost: f64,
    conversions: f64,
}

impl Figures {
    fn of(row: &MetricRow) -> Self {
        Self {
            cost: row.cost,
            conversions: row.conversions,
        }
    }

    fn cpa(self) -> Option<f64> {
        if self.conversions > 0.0 {
            Some((self.cost / self.conversions).round())
        } else {
            None
        }
    }

    fn render(self) -> String {
        format!(
            "CPA{}、CV{}、Cost{}",
            format_yen(self.cpa()),
            format_count(self.conversions),
            format_yen(Some(self.cost))
        )
    }
}

/// Summary line over the latest period, then one line per latest campaign
/// with the prior week in parentheses when that campaign has a prior row.
pub fn build_results_block(latest: &[MetricRow], prior: &[MetricRow]) -> ResultsBlock {
    let total = latest.iter().fold(
        Figures {
            cost: 0.0,
            conversions: 0.0,
        },
        |acc, row| Figures {
            cost: acc.cost + row.cost,
            conversions: acc.conversions + row.conversions,
        },
    );

    let mut prior_by_campaign = HashMap::<&str, &MetricRow>::new();
    for row in prior {
        prior_by_campaign.insert(row.campaign.as_str(), row);
    }

    let mut body = Vec::with_capacity(latest.len() + 1);
    body.push(format!("{BULLET_PREFIX}全体 : {}", total.render()));

    for row in latest {
        let comparison = prior_by_campaign
            .get(row.campaign.as_str())
            .map(|previous| format!("（前週 : {}）", Figures::of(previous).render()))
            .unwrap_or_default();
        body.push(format!(
            "{BULLET_PREFIX}{} : {}{comparison}",
            row.campaign,
            Figures::of(row).render()
        ));
    }

    ResultsBlock {
        heading: Section::Results.canonical_label().to_string(),
        body,
    }
}

/// `¥` and grouped thousands in whole units; `None` renders the unknown marker.
pub fn format_yen(value: Option<f64>) -> String {
    match value.filter(|value| value.is_finite()) {
        Some(value) => format!("¥{}", group_thousands(value.round() as i64)),
        None => UNKNOWN_MARKER.to_string(),
    }
}

pub fn format_count(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    group_thousands(value.round() as i64)
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// Deduplicated, insertion-ordered numeric literals the generator may use.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NumericAllowList {
    tokens: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
    #[serde(skip)]
    cap: usize,
    #[serde(skip)]
    dropped: usize,
}

impl NumericAllowList {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            cap,
            ..Self::default()
        }
    }

    /// Adds `token` unless it is a duplicate or the cap is reached.
    pub fn push(&mut self, token: &str) {
        if self.seen.contains(token) {
            return;
        }
        if self.tokens.len() >= self.cap {
            self.dropped += 1;
            return;
        }
        self.insert(token);
    }

    /// Adds `token` even past the cap.
    pub fn push_required(&mut self, token: &str) {
        if !self.seen.contains(token) {
            self.insert(token);
        }
    }

    fn insert(&mut self, token: &str) {
        self.seen.insert(token.to_string());
        self.tokens.push(token.to_string());
    }

    pub fn contains(&self, token: &str) -> bool {
        self.seen.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Finds currency, percentage and bare numeric literals in text.
pub struct NumericTokenExtractor {
    pattern: Regex,
}

impl NumericTokenExtractor {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(r"([¥￥])?(\d+(?:,\d{3})*(?:\.\d+)?)(%)?")
            .context("failed to compile numeric token regex")?;
        Ok(Self { pattern })
    }

    /// Decorated tokens come first, then the bare literal. Bare literals
    /// longer than `bare_limit` characters are skipped when a limit is given.
    pub fn extract(&self, text: &str, bare_limit: Option<usize>) -> Vec<String> {
        let mut tokens = Vec::new();
        for captures in self.pattern.captures_iter(text) {
            let Some(number) = captures.get(2).map(|value| value.as_str()) else {
                continue;
            };
            if let Some(glyph) = captures.get(1) {
                tokens.push(format!("{}{number}", glyph.as_str()));
            }
            if captures.get(3).is_some() {
                tokens.push(format!("{number}%"));
            }
            if bare_limit.is_none_or(|limit| number.chars().count() <= limit) {
                tokens.push(number.to_string());
            }
        }
        tokens
    }
}

/// Every token of the results block first, uncapped, then tokens from up
/// to `raw_scan_rows` raw detail lines while the list is below `cap`.
pub fn build_allow_list(
    extractor: &NumericTokenExtractor,
    block: &ResultsBlock,
    raw_lines: &[String],
    raw_scan_rows: usize,
    cap: usize,
) -> NumericAllowList {
    let mut allow_list = NumericAllowList::with_cap(cap);

    for token in extractor.extract(&block.text(), None) {
        allow_list.push_required(&token);
    }
    if allow_list.len() >= cap {
        warn!(
            cap,
            block_tokens = allow_list.len(),
            "results block fills the allow-list cap; raw rows add nothing"
        );
    }

    for line in raw_lines.iter().take(raw_scan_rows) {
        for token in extractor.extract(line, Some(MAX_BARE_TOKEN_CHARS)) {
            allow_list.push(&token);
        }
    }

    allow_list
}
