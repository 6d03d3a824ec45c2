use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::store::SheetTable;

#[derive(Parser, Debug)]
#[command(
    name = "adweekly",
    version,
    about = "Guarded weekly ad-performance report generation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Import(ImportArgs),
    Aggregate(AggregateArgs),
    Report(ReportArgs),
    Normalize(NormalizeArgs),
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ImportTable {
    Weekly,
    Raw,
    Baselines,
    Docs,
    Reports,
    Styles,
}

impl ImportTable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Raw => "raw",
            Self::Baselines => "baselines",
            Self::Docs => "docs",
            Self::Reports => "reports",
            Self::Styles => "styles",
        }
    }

    pub fn sheet(self) -> SheetTable {
        match self {
            Self::Weekly => SheetTable::WeeklyAgg,
            Self::Raw => SheetTable::RawData,
            Self::Baselines => SheetTable::Baselines,
            Self::Docs => SheetTable::DocIndex,
            Self::Reports => SheetTable::ReportIndex,
            Self::Styles => SheetTable::StyleIndex,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[arg(long, default_value = ".cache/adweekly")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub table: ImportTable,

    #[arg(long)]
    pub csv: PathBuf,

    #[arg(long, default_value_t = false)]
    pub replace: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AggregateArgs {
    #[arg(long, default_value = ".cache/adweekly")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(long, default_value = ".cache/adweekly")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// JSON file with any `ReportConfig` fields, including weight tables.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub lookback_weeks: Option<usize>,

    #[arg(long)]
    pub cards_per_campaign: Option<usize>,

    #[arg(long)]
    pub style_exemplars: Option<usize>,

    #[arg(long)]
    pub force_channel: Option<String>,

    #[arg(long)]
    pub force_brand: Option<String>,

    #[arg(long, default_value_t = false)]
    pub no_synthesize_results: bool,

    /// Reference date for recency bonuses (defaults to today, UTC).
    #[arg(long)]
    pub today: Option<String>,

    #[arg(long)]
    pub openai_api_key: Option<String>,

    #[arg(long)]
    pub openai_endpoint: Option<String>,

    #[arg(long)]
    pub slack_webhook_url: Option<String>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NormalizeArgs {
    /// Generated text to normalize.
    #[arg(long)]
    pub input: PathBuf,

    /// Results body lines, one per line, without the heading.
    #[arg(long)]
    pub results: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub no_synthesize_results: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/adweekly")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
