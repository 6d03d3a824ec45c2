//! SQLite stand-in for the report spreadsheet. Every sheet is a table of
//! TEXT cells; typed values are parsed leniently on load.

pub mod import;
pub mod load;
pub mod runs;
mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::ensure_directory;

pub const DEFAULT_DB_FILE: &str = "adweekly.sqlite";

pub struct Column {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Multi-line text whose leading indentation is content.
    pub verbatim: bool,
}

const fn column(name: &'static str, aliases: &'static [&'static str]) -> Column {
    Column {
        name,
        aliases,
        verbatim: false,
    }
}

const fn text_column(name: &'static str) -> Column {
    Column {
        name,
        aliases: &[],
        verbatim: true,
    }
}

const WEEKLY_COLUMNS: &[Column] = &[
    column("week_start", &["periodstart"]),
    column("week_end", &["periodend"]),
    column("campaign", &["campaignname"]),
    column("impressions", &["impr"]),
    column("clicks", &[]),
    column("conversions", &["cv"]),
    column("cost", &[]),
    column("ctr", &[]),
    column("cvr", &[]),
    column("cpc", &[]),
    column("cpa", &[]),
];

const RAW_COLUMNS: &[Column] = &[
    column("date", &["day"]),
    column("campaign", &["campaignname"]),
    column("status", &["campaignstatus"]),
    column("impressions", &["impr"]),
    column("clicks", &[]),
    column("conversions", &["cv"]),
    column("cost", &[]),
    column("avg_cpc", &["averagecpc"]),
];

const BASELINE_COLUMNS: &[Column] = &[
    column("metric", &[]),
    column("direction", &[]),
    column("target", &[]),
    column("good_max", &[]),
    column("bad_min", &[]),
    column("min_impr", &["minimpressions"]),
    column("min_clicks", &[]),
    column("min_cv", &["minconversions"]),
    column("campaign_name", &["campaginname", "campaign"]),
];

const CARD_COLUMNS: &[Column] = &[
    column("title", &[]),
    column("key_takeaways", &[]),
    column("checklist", &[]),
    column("issue_category", &[]),
    column("campaign_meta", &["meta"]),
    column("campaign_name", &["campaginname"]),
    column("outcome_effect", &[]),
    column("quality_score", &[]),
    column("recency", &[]),
];

const STYLE_COLUMNS: &[Column] = &[
    column("style_id", &[]),
    text_column("structure_template"),
    column("phrasing_rules", &[]),
    column("channel", &[]),
    column("brand", &[]),
    column("priority", &[]),
    column("recency", &[]),
    text_column("exemplar_text"),
];

/// Sheets mirrored from the report spreadsheet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SheetTable {
    WeeklyAgg,
    RawData,
    Baselines,
    DocIndex,
    ReportIndex,
    StyleIndex,
}

impl SheetTable {
    pub const ALL: [SheetTable; 6] = [
        SheetTable::WeeklyAgg,
        SheetTable::RawData,
        SheetTable::Baselines,
        SheetTable::DocIndex,
        SheetTable::ReportIndex,
        SheetTable::StyleIndex,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            Self::WeeklyAgg => "weekly_agg",
            Self::RawData => "raw_data",
            Self::Baselines => "baselines",
            Self::DocIndex => "doc_index",
            Self::ReportIndex => "report_index",
            Self::StyleIndex => "style_index",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Self::WeeklyAgg => WEEKLY_COLUMNS,
            Self::RawData => RAW_COLUMNS,
            Self::Baselines => BASELINE_COLUMNS,
            Self::DocIndex | Self::ReportIndex => CARD_COLUMNS,
            Self::StyleIndex => STYLE_COLUMNS,
        }
    }

    pub fn column_list(self) -> String {
        self.columns()
            .iter()
            .map(|column| column.name)
            .collect::<Vec<&str>>()
            .join(", ")
    }
}

pub struct Store {
    connection: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        schema::configure_connection(&connection)?;
        schema::ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let count = self
            .connection
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("failed to count rows in {table}"))?;
        Ok(count)
    }
}
