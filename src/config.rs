use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CycleError;
use crate::model::CampaignMeta;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_CHANNEL: &str = "search";
pub const DEFAULT_BRAND: &str = "non";

/// Knowledge card scoring weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub channel_match: f64,
    pub brand_match: f64,
    pub same_campaign: f64,
    pub default_quality: f64,
    pub recent_bonus: f64,
    pub recent_window_days: i64,
    pub report_source: f64,
    pub effect_multiplier: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            channel_match: 10.0,
            brand_match: 10.0,
            same_campaign: 15.0,
            default_quality: 50.0,
            recent_bonus: 5.0,
            recent_window_days: 60,
            report_source: 3.0,
            effect_multiplier: 30.0,
        }
    }
}

/// Style template scoring weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleWeights {
    pub default_priority: f64,
    pub channel_match: f64,
    pub brand_match: f64,
    pub recent_bonus: f64,
    pub recent_window_days: i64,
}

impl Default for StyleWeights {
    fn default() -> Self {
        Self {
            default_priority: 50.0,
            channel_match: 10.0,
            brand_match: 10.0,
            recent_bonus: 5.0,
            recent_window_days: 60,
        }
    }
}

/// Everything a cycle reads, validated once before any work starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub lookback_weeks: usize,
    pub cards_per_campaign: usize,
    pub style_exemplars: usize,
    pub force_channel: Option<String>,
    pub force_brand: Option<String>,
    pub allow_list_cap: usize,
    pub raw_scan_rows: usize,
    pub synthesize_missing_results: bool,
    pub ranking: RankingWeights,
    pub style: StyleWeights,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 900,
            lookback_weeks: 4,
            cards_per_campaign: 3,
            style_exemplars: 2,
            force_channel: None,
            force_brand: None,
            allow_list_cap: 3000,
            raw_scan_rows: 300,
            synthesize_missing_results: true,
            ranking: RankingWeights::default(),
            style: StyleWeights::default(),
        }
    }
}

impl ReportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), CycleError> {
        if self.model.trim().is_empty() {
            return invalid("model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return invalid("temperature must be within 0..=2");
        }
        if self.max_tokens == 0 {
            return invalid("max_tokens must be positive");
        }
        if self.lookback_weeks == 0 {
            return invalid("lookback_weeks must be at least 1");
        }
        if self.cards_per_campaign == 0 {
            return invalid("cards_per_campaign must be at least 1");
        }
        if self.style_exemplars > 10 {
            return invalid("style_exemplars must be at most 10");
        }
        if self.allow_list_cap == 0 {
            return invalid("allow_list_cap must be positive");
        }
        Ok(())
    }

    /// Forced meta for a campaign, or `None` when inference should run.
    pub fn forced_meta(&self) -> Option<CampaignMeta> {
        if self.force_channel.is_none() && self.force_brand.is_none() {
            return None;
        }
        Some(CampaignMeta {
            channel: self.force_channel.clone(),
            brand: self.force_brand.clone(),
        })
    }

    /// Meta used to score style templates.
    pub fn style_meta(&self) -> CampaignMeta {
        CampaignMeta::new(
            self.force_channel.as_deref().unwrap_or(DEFAULT_CHANNEL),
            self.force_brand.as_deref().unwrap_or(DEFAULT_BRAND),
        )
    }
}

/// Secrets for the two external calls.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub endpoint: String,
    pub webhook_url: String,
}

impl Credentials {
    /// Flag values win over the environment; blanks count as missing.
    pub fn resolve(
        api_key: Option<&str>,
        webhook_url: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<Self, CycleError> {
        let api_key = first_non_blank(api_key, "OPENAI_API_KEY")
            .ok_or_else(|| CycleError::MissingConfiguration("OPENAI_API_KEY is not set".to_string()))?;
        let webhook_url = first_non_blank(webhook_url, "SLACK_WEBHOOK_URL").ok_or_else(|| {
            CycleError::MissingConfiguration("SLACK_WEBHOOK_URL is not set".to_string())
        })?;
        let endpoint = first_non_blank(endpoint, "OPENAI_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            api_key,
            endpoint,
            webhook_url,
        })
    }
}

fn invalid(message: &str) -> Result<(), CycleError> {
    Err(CycleError::InvalidConfiguration(message.to_string()))
}

fn first_non_blank(explicit: Option<&str>, env_key: &str) -> Option<String> {
    if let Some(value) = explicit.map(str::trim).filter(|value| !value.is_empty()) {
        return Some(value.to_string());
    }
    std::env::var(env_key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
