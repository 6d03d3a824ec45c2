use anyhow::{Context, Result};
use chrono::Duration;
use rusqlite::{Connection, Row, params};
use tracing::{debug, info};

use super::SheetTable;
use crate::model::{
    BaselineRule, Direction, KnowledgeCard, Metric, MetricRow, RawRow, SourceKind, StyleTemplate,
};
use crate::pipeline::baseline::BaselineSet;
use crate::pipeline::lenient::{
    parse_count, parse_date, parse_effect, parse_list, parse_meta, parse_metric_number,
    parse_number, parse_ratio,
};

fn select_all(sheet: SheetTable) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY row_id",
        sheet.column_list(),
        sheet.table_name()
    )
}

fn cell(row: &Row<'_>, index: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(index)?.unwrap_or_default())
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Weekly rows in stored order; rows without a readable start or campaign are skipped.
pub fn load_weekly(connection: &Connection) -> Result<Vec<MetricRow>> {
    let mut statement = connection
        .prepare(&select_all(SheetTable::WeeklyAgg))
        .context("failed to prepare weekly_agg query")?;
    let mut rows = statement.query([])?;
    let mut loaded = Vec::new();
    let mut skipped = 0usize;

    while let Some(row) = rows.next()? {
        let campaign = cell(row, 2)?.trim().to_string();
        let Some(period_start) = parse_date(&cell(row, 0)?) else {
            skipped += 1;
            continue;
        };
        if campaign.is_empty() {
            skipped += 1;
            continue;
        }
        let period_end =
            parse_date(&cell(row, 1)?).unwrap_or(period_start + Duration::days(6));

        loaded.push(MetricRow {
            period_start,
            period_end,
            campaign,
            impressions: parse_count(&cell(row, 3)?),
            clicks: parse_count(&cell(row, 4)?),
            conversions: parse_count(&cell(row, 5)?),
            cost: parse_count(&cell(row, 6)?),
            ctr: parse_ratio(&cell(row, 7)?),
            cvr: parse_ratio(&cell(row, 8)?),
            cpc: parse_number(&cell(row, 9)?),
            cpa: parse_number(&cell(row, 10)?),
        });
    }

    if skipped > 0 {
        debug!(skipped, "skipped weekly rows without a start date or campaign");
    }
    Ok(loaded)
}

pub fn load_raw(connection: &Connection) -> Result<Vec<RawRow>> {
    let mut statement = connection
        .prepare(&select_all(SheetTable::RawData))
        .context("failed to prepare raw_data query")?;
    let mut rows = statement.query([])?;
    let mut loaded = Vec::new();

    while let Some(row) = rows.next()? {
        let Some(date) = parse_date(&cell(row, 0)?) else {
            debug!("skipping raw row without a readable date");
            continue;
        };
        loaded.push(RawRow {
            date,
            campaign: cell(row, 1)?.trim().to_string(),
            status: cell(row, 2)?.trim().to_string(),
            impressions: parse_count(&cell(row, 3)?),
            clicks: parse_count(&cell(row, 4)?),
            conversions: parse_count(&cell(row, 5)?),
            cost: parse_count(&cell(row, 6)?),
            average_cpc: parse_count(&cell(row, 7)?),
        });
    }
    Ok(loaded)
}

/// First `limit` raw rows as tab-joined text, for numeric token scanning.
pub fn load_raw_lines(connection: &Connection, limit: usize) -> Result<Vec<String>> {
    let sql = format!(
        "{} LIMIT ?1",
        select_all(SheetTable::RawData)
    );
    let mut statement = connection
        .prepare(&sql)
        .context("failed to prepare raw_data scan")?;
    let column_count = SheetTable::RawData.columns().len();
    let mut rows = statement.query(params![limit as i64])?;
    let mut lines = Vec::new();

    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(column_count);
        for index in 0..column_count {
            cells.push(cell(row, index)?);
        }
        lines.push(cells.join("\t"));
    }
    Ok(lines)
}

/// Rules keyed by scope; a blank or `global` campaign cell is global.
pub fn load_baselines(connection: &Connection) -> Result<BaselineSet> {
    let mut statement = connection
        .prepare(&select_all(SheetTable::Baselines))
        .context("failed to prepare baselines query")?;
    let mut rows = statement.query([])?;
    let mut baselines = BaselineSet::default();

    while let Some(row) = rows.next()? {
        let raw_metric = cell(row, 0)?;
        let Some(metric) = Metric::parse(&raw_metric) else {
            debug!(metric = %raw_metric, "skipping baseline row with unknown metric");
            continue;
        };
        let rule = BaselineRule {
            metric,
            direction: Direction::parse_lenient(&cell(row, 1)?),
            target: parse_metric_number(metric, &cell(row, 2)?),
            good_max: parse_metric_number(metric, &cell(row, 3)?),
            bad_min: parse_metric_number(metric, &cell(row, 4)?),
            min_impressions: parse_count(&cell(row, 5)?),
            min_clicks: parse_count(&cell(row, 6)?),
            min_conversions: parse_count(&cell(row, 7)?),
        };

        let campaign = cell(row, 8)?.trim().to_string();
        debug!(
            metric = metric.as_str(),
            direction = rule.direction.as_str(),
            campaign = %campaign,
            "loaded baseline rule"
        );
        if campaign.is_empty() || campaign.eq_ignore_ascii_case("global") {
            baselines.insert_global(rule);
        } else {
            baselines.insert_for_campaign(&campaign, rule);
        }
    }

    info!(
        global = baselines.global_count(),
        per_campaign = baselines.campaign_override_count(),
        "loaded baselines"
    );
    Ok(baselines)
}

pub fn load_cards(connection: &Connection, source: SourceKind) -> Result<Vec<KnowledgeCard>> {
    let sheet = match source {
        SourceKind::Doc => SheetTable::DocIndex,
        SourceKind::Report => SheetTable::ReportIndex,
    };
    let mut statement = connection
        .prepare(&select_all(sheet))
        .with_context(|| format!("failed to prepare {} query", sheet.table_name()))?;
    let mut rows = statement.query([])?;
    let mut cards = Vec::new();

    while let Some(row) = rows.next()? {
        let recency_raw = cell(row, 8)?.trim().to_string();
        cards.push(KnowledgeCard {
            title: cell(row, 0)?.trim().to_string(),
            key_takeaways: cell(row, 1)?.trim().to_string(),
            checklist: parse_list(&cell(row, 2)?),
            issue_category: cell(row, 3)?.trim().to_string(),
            meta: parse_meta(&cell(row, 4)?),
            campaign_name: non_blank(cell(row, 5)?),
            outcome_effect: parse_effect(&cell(row, 6)?),
            quality_score: parse_number(&cell(row, 7)?),
            recency: parse_date(&recency_raw),
            recency_raw,
            source,
        });
    }

    debug!(
        table = sheet.table_name(),
        source = source.as_str(),
        cards = cards.len(),
        "loaded knowledge cards"
    );
    Ok(cards)
}

pub fn load_styles(connection: &Connection) -> Result<Vec<StyleTemplate>> {
    let mut statement = connection
        .prepare(&select_all(SheetTable::StyleIndex))
        .context("failed to prepare style_index query")?;
    let mut rows = statement.query([])?;
    let mut templates = Vec::new();

    while let Some(row) = rows.next()? {
        let recency_raw = cell(row, 6)?.trim().to_string();
        templates.push(StyleTemplate {
            style_id: cell(row, 0)?.trim().to_string(),
            structure_template: cell(row, 1)?,
            phrasing_rules: parse_list(&cell(row, 2)?),
            channel: cell(row, 3)?.trim().to_string(),
            brand: cell(row, 4)?.trim().to_string(),
            priority: parse_number(&cell(row, 5)?),
            recency: parse_date(&recency_raw),
            recency_raw,
            exemplar_text: cell(row, 7)?,
        });
    }
    Ok(templates)
}

/// Replaces `weekly_agg` with freshly aggregated rows.
pub fn replace_weekly(connection: &mut Connection, rows: &[MetricRow]) -> Result<usize> {
    let transaction = connection
        .transaction()
        .context("failed to start weekly_agg transaction")?;
    transaction
        .execute("DELETE FROM weekly_agg", [])
        .context("failed to clear weekly_agg")?;
    {
        let mut statement = transaction.prepare(&format!(
            "INSERT INTO weekly_agg ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            SheetTable::WeeklyAgg.column_list()
        ))?;
        for row in rows {
            statement.execute(params![
                row.period_start.to_string(),
                row.period_end.to_string(),
                row.campaign,
                row.impressions.to_string(),
                row.clicks.to_string(),
                row.conversions.to_string(),
                row.cost.to_string(),
                optional_text(row.ctr),
                optional_text(row.cvr),
                optional_text(row.cpc),
                optional_text(row.cpa),
            ])?;
        }
    }
    transaction
        .commit()
        .context("failed to commit weekly_agg")?;
    Ok(rows.len())
}

fn optional_text(value: Option<f64>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "—".to_string())
}
