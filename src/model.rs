use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One campaign's aggregate for one Monday-aligned week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub campaign: String,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub cost: f64,
    pub ctr: Option<f64>,
    pub cvr: Option<f64>,
    pub cpc: Option<f64>,
    pub cpa: Option<f64>,
}

impl MetricRow {
    pub fn value_of(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Cpa => self.cpa,
            Metric::Ctr => self.ctr,
            Metric::Cvr => self.cvr,
            Metric::Cpc => self.cpc,
            Metric::Cv => Some(self.conversions),
        }
    }

    pub fn volume(&self) -> Volume {
        Volume {
            impressions: self.impressions,
            clicks: self.clicks,
            conversions: self.conversions,
        }
    }
}

/// Daily row as exported by the ad platform.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub date: NaiveDate,
    pub campaign: String,
    pub status: String,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub cost: f64,
    pub average_cpc: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Volume {
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Metric {
    Cpa,
    Ctr,
    Cvr,
    Cpc,
    Cv,
}

impl Metric {
    pub const ALL: [Metric; 5] = [Metric::Cpa, Metric::Ctr, Metric::Cvr, Metric::Cpc, Metric::Cv];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpa => "CPA",
            Self::Ctr => "CTR",
            Self::Cvr => "CVR",
            Self::Cpc => "CPC",
            Self::Cv => "CV",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CPA" => Some(Self::Cpa),
            "CTR" => Some(Self::Ctr),
            "CVR" => Some(Self::Cvr),
            "CPC" => Some(Self::Cpc),
            "CV" => Some(Self::Cv),
            _ => None,
        }
    }

    /// Ratio metrics are stored as fractions; percent cells are divided by 100.
    pub fn is_ratio(self) -> bool {
        matches!(self, Self::Ctr | Self::Cvr)
    }

    pub fn issue_tag(self) -> IssueTag {
        match self {
            Self::Cpa => IssueTag::CpaUp,
            Self::Ctr => IssueTag::CtrDown,
            Self::Cvr => IssueTag::CvrDown,
            Self::Cpc => IssueTag::CpcUp,
            Self::Cv => IssueTag::CvDown,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowerIsBetter => "lower_is_better",
            Self::HigherIsBetter => "higher_is_better",
        }
    }

    /// Unknown spellings fall back to `lower_is_better`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "higher_is_better" | "higher" | "up" => Self::HigherIsBetter,
            _ => Self::LowerIsBetter,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRule {
    pub metric: Metric,
    pub direction: Direction,
    pub target: Option<f64>,
    pub good_max: Option<f64>,
    pub bad_min: Option<f64>,
    pub min_impressions: f64,
    pub min_clicks: f64,
    pub min_conversions: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum IssueTag {
    #[serde(rename = "CPA_UP")]
    CpaUp,
    #[serde(rename = "CTR_DOWN")]
    CtrDown,
    #[serde(rename = "CVR_DOWN")]
    CvrDown,
    #[serde(rename = "CPC_UP")]
    CpcUp,
    #[serde(rename = "CV_DOWN")]
    CvDown,
}

impl IssueTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CpaUp => "CPA_UP",
            Self::CtrDown => "CTR_DOWN",
            Self::CvrDown => "CVR_DOWN",
            Self::CpcUp => "CPC_UP",
            Self::CvDown => "CV_DOWN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "CPA_UP" => Some(Self::CpaUp),
            "CTR_DOWN" => Some(Self::CtrDown),
            "CVR_DOWN" => Some(Self::CvrDown),
            "CPC_UP" => Some(Self::CpcUp),
            "CV_DOWN" => Some(Self::CvDown),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Doc,
    Report,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Report => "report",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignMeta {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
}

impl CampaignMeta {
    pub fn new(channel: &str, brand: &str) -> Self {
        Self {
            channel: Some(channel.to_string()),
            brand: Some(brand.to_string()),
        }
    }
}

/// Knowledge card from either the doc index or the report index.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeCard {
    pub title: String,
    pub key_takeaways: String,
    pub checklist: Vec<String>,
    pub issue_category: String,
    pub meta: CampaignMeta,
    pub campaign_name: Option<String>,
    pub outcome_effect: BTreeMap<String, f64>,
    pub quality_score: Option<f64>,
    pub recency: Option<NaiveDate>,
    pub recency_raw: String,
    pub source: SourceKind,
}

/// Display-safe projection of a ranked card; meta and effect stay behind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSummary {
    pub title: String,
    pub key_takeaways: String,
    pub checklist: Vec<String>,
    pub source: SourceKind,
    pub recency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleTemplate {
    pub style_id: String,
    pub structure_template: String,
    pub phrasing_rules: Vec<String>,
    pub channel: String,
    pub brand: String,
    pub priority: Option<f64>,
    pub recency: Option<NaiveDate>,
    pub recency_raw: String,
    pub exemplar_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub dry_run: bool,
    pub title: String,
    pub model: String,
    pub period_starts: Vec<String>,
    pub campaign_count: usize,
    pub issue_count: usize,
    pub knowledge_card_count: usize,
    pub allow_list_size: usize,
    pub prompt_sha256: String,
    pub results_synthesized: bool,
    pub ambiguous_line_count: usize,
    pub failure_reason: Option<String>,
}
