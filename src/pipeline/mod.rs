//! One reporting cycle: classify, rank, guard, prompt, generate once,
//! normalize, deliver once.

pub mod baseline;
pub mod guardrail;
pub mod headings;
pub mod issues;
pub mod knowledge;
pub mod lenient;
pub mod normalize;
pub mod period;
pub mod prompt;
pub mod style;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::ReportConfig;
use crate::error::CycleError;
use crate::model::{KnowledgeCard, MetricRow, StyleTemplate};

use self::baseline::BaselineSet;
use self::guardrail::{NumericAllowList, NumericTokenExtractor, ResultsBlock};
use self::knowledge::{MetaInference, RankingContext};
use self::normalize::{NarrativeNormalizer, NormalizedText};
use self::period::LookbackWindow;
use self::prompt::{CampaignContext, GenerationRequest, PromptInputs};
use self::style::StyleGuide;

#[cfg(test)]
mod tests;

/// External free-text generator. Output is untrusted.
pub trait TextGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// External delivery target for the final report.
pub trait ReportSink {
    fn deliver(&self, title: &str, body: &str) -> Result<()>;
}

/// Everything read from the stores for one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleInputs {
    pub weekly: Vec<MetricRow>,
    pub raw_lines: Vec<String>,
    pub baselines: BaselineSet,
    pub doc_cards: Vec<KnowledgeCard>,
    pub report_cards: Vec<KnowledgeCard>,
    pub styles: Vec<StyleTemplate>,
}

/// Deterministic artifacts computed before the generator is called.
#[derive(Debug, Clone)]
pub struct PreparedCycle {
    pub title: String,
    pub window: LookbackWindow,
    pub results: ResultsBlock,
    pub allow_list: NumericAllowList,
    pub campaigns: Vec<CampaignContext>,
    pub style: StyleGuide,
    pub request: GenerationRequest,
}

impl PreparedCycle {
    pub fn issue_count(&self) -> usize {
        self.campaigns
            .iter()
            .map(|campaign| campaign.issues.len())
            .sum()
    }

    pub fn knowledge_card_count(&self) -> usize {
        self.campaigns
            .iter()
            .map(|campaign| campaign.ref_cards.len())
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub prepared: PreparedCycle,
    pub normalized: NormalizedText,
}

pub struct ReportPipeline {
    config: ReportConfig,
    normalizer: NarrativeNormalizer,
    extractor: NumericTokenExtractor,
    inference: MetaInference,
}

impl ReportPipeline {
    pub fn new(config: ReportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: NarrativeNormalizer::new(config.synthesize_missing_results)?,
            extractor: NumericTokenExtractor::new()?,
            inference: MetaInference::new()?,
            config,
        })
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Builds the title, results block, allow-list, knowledge and prompt.
    pub fn prepare(&self, inputs: &CycleInputs, today: NaiveDate) -> Result<PreparedCycle> {
        let window = period::select_lookback(&inputs.weekly, self.config.lookback_weeks)?;
        let latest = window.latest_rows();
        let prior = window.prior_rows();
        let (Some(first), Some(latest_start)) = (latest.first(), window.latest_start()) else {
            return Err(CycleError::MissingData("latest period has no rows".to_string()).into());
        };
        let title = period::report_title(latest_start, first.period_end);

        info!(
            periods = window.starts.len(),
            latest_start = %latest_start,
            latest_campaigns = latest.len(),
            prior_campaigns = prior.len(),
            "selected lookback window"
        );

        let results = guardrail::build_results_block(&latest, &prior);
        let allow_list = guardrail::build_allow_list(
            &self.extractor,
            &results,
            &inputs.raw_lines,
            self.config.raw_scan_rows,
            self.config.allow_list_cap,
        );

        let cards = inputs
            .doc_cards
            .iter()
            .chain(inputs.report_cards.iter())
            .cloned()
            .collect::<Vec<KnowledgeCard>>();
        let forced = self.config.forced_meta();
        let campaigns = latest
            .iter()
            .map(|row| {
                let issues = issues::classify_issues(row, &inputs.baselines);
                let meta = forced
                    .clone()
                    .unwrap_or_else(|| self.inference.infer(&row.campaign));
                let context = RankingContext {
                    issues: &issues,
                    meta: &meta,
                    campaign: &row.campaign,
                    today,
                    limit: self.config.cards_per_campaign,
                };
                let ref_cards = knowledge::rank_cards(&cards, &context, &self.config.ranking);
                debug!(
                    campaign = %row.campaign,
                    issues = issues.len(),
                    cards = ref_cards.len(),
                    "classified campaign"
                );
                CampaignContext {
                    name: row.campaign.clone(),
                    issues,
                    meta,
                    ref_cards,
                }
            })
            .collect::<Vec<CampaignContext>>();

        let style = style::select_style(
            &inputs.styles,
            &self.config.style_meta(),
            today,
            self.config.style_exemplars,
            &self.config.style,
            self.normalizer.grammar(),
        );

        let metrics_tsv = period::metrics_tsv(&window.rows);
        let request = prompt::assemble_prompt(
            &PromptInputs {
                style: &style,
                results: &results,
                allow_list: &allow_list,
                campaigns: &campaigns,
                metrics_tsv: &metrics_tsv,
            },
            &self.config,
        )?;

        info!(
            title = %title,
            allow_list = allow_list.len(),
            style_fallback = style.fallback,
            exemplars = style.exemplars.len(),
            "prepared cycle"
        );

        Ok(PreparedCycle {
            title,
            window,
            results,
            allow_list,
            campaigns,
            style,
            request,
        })
    }

    /// Calls the generator once, normalizes, then delivers once.
    pub fn run(
        &self,
        prepared: PreparedCycle,
        generator: &dyn TextGenerator,
        sink: &dyn ReportSink,
    ) -> Result<CycleOutcome> {
        let generated = generator
            .generate(&prepared.request)
            .context("text generation failed; nothing was delivered")?;
        info!(chars = generated.chars().count(), "received generated text");

        let normalized = self.normalizer.normalize(&generated, &prepared.results.body);
        let delivered_results =
            normalize::results_section_lines(self.normalizer.grammar(), &normalized.text);
        if delivered_results.is_some_and(|lines| lines != prepared.results.body) {
            warn!("results section differs from the computed block");
        }

        sink.deliver(&prepared.title, &normalized.text)
            .context("report delivery failed")?;
        info!(title = %prepared.title, "delivered report");

        Ok(CycleOutcome {
            prepared,
            normalized,
        })
    }
}
