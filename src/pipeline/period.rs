use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate};
use tracing::warn;

use crate::error::CycleError;
use crate::model::{MetricRow, RawRow};

const WEEKDAYS_FROM_SUNDAY: [&str; 7] = ["日", "月", "火", "水", "木", "金", "土"];
const TSV_HEADER: [&str; 11] = [
    "WeekStart", "WeekEnd", "Campaign", "Impr", "Clicks", "CV", "Cost", "CTR", "CVR", "CPC", "CPA",
];

/// Rows of the most recent `weeks` distinct periods, oldest period first.
#[derive(Debug, Clone)]
pub struct LookbackWindow {
    pub starts: Vec<NaiveDate>,
    pub rows: Vec<MetricRow>,
}

impl LookbackWindow {
    pub fn latest_start(&self) -> Option<NaiveDate> {
        self.starts.last().copied()
    }

    pub fn prior_start(&self) -> Option<NaiveDate> {
        self.starts.iter().rev().nth(1).copied()
    }

    pub fn latest_rows(&self) -> Vec<MetricRow> {
        self.rows_for(self.latest_start())
    }

    pub fn prior_rows(&self) -> Vec<MetricRow> {
        self.rows_for(self.prior_start())
    }

    fn rows_for(&self, start: Option<NaiveDate>) -> Vec<MetricRow> {
        let Some(start) = start else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter(|row| row.period_start == start)
            .cloned()
            .collect()
    }
}

/// Picks the latest `weeks` distinct period starts by date, whatever the
/// stored row order.
pub fn select_lookback(rows: &[MetricRow], weeks: usize) -> Result<LookbackWindow, CycleError> {
    if rows.is_empty() {
        return Err(CycleError::MissingData("weekly_agg has no rows".to_string()));
    }

    let distinct = rows
        .iter()
        .map(|row| row.period_start)
        .collect::<BTreeSet<NaiveDate>>();
    let mut starts = distinct.into_iter().rev().take(weeks).collect::<Vec<NaiveDate>>();
    starts.sort();

    let selected = rows
        .iter()
        .filter(|row| starts.contains(&row.period_start))
        .map(checked_period)
        .collect::<Vec<MetricRow>>();

    Ok(LookbackWindow {
        starts,
        rows: selected,
    })
}

fn checked_period(row: &MetricRow) -> MetricRow {
    let expected = row.period_start + Duration::days(6);
    if row.period_end == expected {
        return row.clone();
    }
    warn!(
        campaign = %row.campaign,
        period_start = %row.period_start,
        period_end = %row.period_end,
        "period end is not six days after its start; recomputed"
    );
    MetricRow {
        period_end: expected,
        ..row.clone()
    }
}

/// `週次広告レポート 2025.09.08（月） ~ 09.14（日）`
pub fn report_title(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "週次広告レポート {}.{:02}.{:02}（{}） ~ {:02}.{:02}（{}）",
        start.year(),
        start.month(),
        start.day(),
        weekday_label(start),
        end.month(),
        end.day(),
        weekday_label(end)
    )
}

fn weekday_label(date: NaiveDate) -> &'static str {
    WEEKDAYS_FROM_SUNDAY[date.weekday().num_days_from_sunday() as usize]
}

pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Default)]
struct WeekBucket {
    impressions: f64,
    clicks: f64,
    conversions: f64,
    cost: f64,
}

/// Rolls daily rows into Monday-aligned weekly rows, ordered by week then campaign.
pub fn aggregate_weekly(raw: &[RawRow]) -> Vec<MetricRow> {
    let mut buckets = BTreeMap::<(NaiveDate, String), WeekBucket>::new();
    for row in raw {
        let bucket = buckets
            .entry((monday_of(row.date), row.campaign.clone()))
            .or_default();
        bucket.impressions += row.impressions;
        bucket.clicks += row.clicks;
        bucket.conversions += row.conversions;
        bucket.cost += row.cost;
    }

    buckets
        .into_iter()
        .map(|((period_start, campaign), bucket)| {
            let ratio = |numerator: f64, denominator: f64| {
                if denominator > 0.0 {
                    numerator / denominator
                } else {
                    0.0
                }
            };
            MetricRow {
                period_start,
                period_end: period_start + Duration::days(6),
                campaign,
                impressions: bucket.impressions,
                clicks: bucket.clicks,
                conversions: round2(bucket.conversions),
                cost: round2(bucket.cost),
                ctr: Some(round4(ratio(bucket.clicks, bucket.impressions))),
                cvr: Some(round4(ratio(bucket.conversions, bucket.clicks))),
                cpc: Some(round2(ratio(bucket.cost, bucket.clicks))),
                cpa: (bucket.conversions > 0.0).then(|| round2(bucket.cost / bucket.conversions)),
            }
        })
        .collect()
}

/// Tab-separated view of the window handed to the generator.
pub fn metrics_tsv(rows: &[MetricRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(TSV_HEADER.join("\t"));
    for row in rows {
        let cells = [
            row.period_start.to_string(),
            row.period_end.to_string(),
            row.campaign.clone(),
            row.impressions.to_string(),
            row.clicks.to_string(),
            row.conversions.to_string(),
            row.cost.to_string(),
            percent_cell(row.ctr),
            percent_cell(row.cvr),
            optional_cell(row.cpc),
            optional_cell(row.cpa),
        ];
        lines.push(cells.join("\t"));
    }
    lines.join("\n")
}

fn percent_cell(value: Option<f64>) -> String {
    value
        .map(|value| format!("{:.2}%", value * 100.0))
        .unwrap_or_else(|| "—".to_string())
}

fn optional_cell(value: Option<f64>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "—".to_string())
}
