use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate};

use super::*;
use crate::error::CycleError;
use crate::model::{CampaignMeta, SourceKind};

struct ScriptedGenerator {
    reply: Option<String>,
    calls: Cell<usize>,
}

impl ScriptedGenerator {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Cell::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            calls: Cell::new(0),
        }
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => bail!("connection refused"),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    delivered: RefCell<Vec<(String, String)>>,
}

impl ReportSink for RecordingSink {
    fn deliver(&self, title: &str, body: &str) -> Result<()> {
        self.delivered
            .borrow_mut()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 16).expect("date")
}

fn week(start: NaiveDate, campaign: &str, cost: f64, conversions: f64) -> MetricRow {
    MetricRow {
        period_start: start,
        period_end: start + Duration::days(6),
        campaign: campaign.to_string(),
        impressions: 20_000.0,
        clicks: 800.0,
        conversions,
        cost,
        ctr: Some(0.04),
        cvr: Some(0.05),
        cpc: Some(cost / 800.0),
        cpa: (conversions > 0.0).then(|| cost / conversions),
    }
}

fn card(title: &str, category: &str, source: SourceKind) -> KnowledgeCard {
    KnowledgeCard {
        title: title.to_string(),
        key_takeaways: String::new(),
        checklist: Vec::new(),
        issue_category: category.to_string(),
        meta: CampaignMeta::default(),
        campaign_name: None,
        outcome_effect: BTreeMap::new(),
        quality_score: None,
        recency: None,
        recency_raw: String::new(),
        source,
    }
}

fn inputs() -> CycleInputs {
    let previous = NaiveDate::from_ymd_opt(2025, 9, 1).expect("date");
    let latest = NaiveDate::from_ymd_opt(2025, 9, 8).expect("date");
    CycleInputs {
        weekly: vec![
            week(previous, "Brand-A", 100_000.0, 10.0),
            week(latest, "Brand-A", 120_000.0, 8.0),
        ],
        raw_lines: vec!["2025-09-08\tBrand-A\tENABLED\t3000\t120\t1\t15000".to_string()],
        doc_cards: vec![card("cpa doc", "CPA_UP", SourceKind::Doc)],
        report_cards: vec![
            card("ctr report", "CTR_DOWN", SourceKind::Report),
            card("cpa report", "CPA_UP", SourceKind::Report),
        ],
        ..CycleInputs::default()
    }
}

fn pipeline() -> ReportPipeline {
    ReportPipeline::new(ReportConfig::default()).expect("pipeline")
}

const FABRICATED: &str = "✅ 進捗\n・CVは堅調\n⚠️ 課題\nCPA が ¥99,999 に上昇\n💨 ネクストアクション\n- 入札を調整\n実績：\n・全体 : CPA¥1、CV999、Cost¥5";

#[test]
fn prepare_builds_title_results_and_ranked_knowledge() {
    let prepared = pipeline().prepare(&inputs(), today()).expect("prepared");

    assert_eq!(prepared.title, "週次広告レポート 2025.09.08（月） ~ 09.14（日）");
    assert_eq!(
        prepared.results.body[1],
        " • Brand-A : CPA¥15,000、CV8、Cost¥120,000（前週 : CPA¥10,000、CV10、Cost¥100,000）"
    );
    assert_eq!(prepared.campaigns.len(), 1);
    assert!(prepared.campaigns[0].issues.is_empty());
    assert!(prepared.campaigns[0].ref_cards.is_empty());
    assert_eq!(prepared.campaigns[0].meta, CampaignMeta::new("search", "brand"));
    assert!(prepared.allow_list.contains("15000"));
    assert!(prepared.request.user.contains(&prepared.results.text()));
}

#[test]
fn bad_cpa_pulls_only_cpa_cards_in_input_order() {
    let mut inputs = inputs();
    let latest = NaiveDate::from_ymd_opt(2025, 9, 8).expect("date");
    inputs.weekly.push(week(latest, "Generic", 250_000.0, 10.0));

    let prepared = pipeline().prepare(&inputs, today()).expect("prepared");
    let generic = prepared
        .campaigns
        .iter()
        .find(|campaign| campaign.name == "Generic")
        .expect("generic campaign");
    assert_eq!(generic.issues, vec![crate::model::IssueTag::CpaUp]);
    let titles = generic
        .ref_cards
        .iter()
        .map(|card| card.title.as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["cpa report", "cpa doc"]);
    assert_eq!(prepared.issue_count(), 1);
    assert_eq!(prepared.knowledge_card_count(), 2);
}

#[test]
fn run_replaces_fabricated_results_and_delivers_once() {
    let pipeline = pipeline();
    let prepared = pipeline.prepare(&inputs(), today()).expect("prepared");
    let generator = ScriptedGenerator::replying(FABRICATED);
    let sink = RecordingSink::default();

    let outcome = pipeline.run(prepared, &generator, &sink).expect("cycle");

    assert_eq!(generator.calls.get(), 1);
    let delivered = sink.delivered.borrow();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, outcome.prepared.title);
    assert_eq!(delivered[0].1, outcome.normalized.text);

    let section = normalize::results_section_lines(pipeline.normalizer.grammar(), &delivered[0].1)
        .expect("results section");
    assert_eq!(section, outcome.prepared.results.body);
    assert!(!delivered[0].1.contains("CV999"));
    assert!(delivered[0].1.contains(":warning: 課題 :\n • CPA が ¥99,999 に上昇"));
}

#[test]
fn generator_failure_aborts_before_delivery() {
    let pipeline = pipeline();
    let prepared = pipeline.prepare(&inputs(), today()).expect("prepared");
    let generator = ScriptedGenerator::failing();
    let sink = RecordingSink::default();

    let error = pipeline
        .run(prepared, &generator, &sink)
        .expect_err("generator failed");

    assert_eq!(generator.calls.get(), 1);
    assert!(sink.delivered.borrow().is_empty());
    assert!(format!("{error:#}").contains("connection refused"));
}

#[test]
fn empty_metrics_feed_is_missing_data() {
    let error = pipeline()
        .prepare(&CycleInputs::default(), today())
        .expect_err("no data");
    assert!(matches!(
        error.downcast_ref::<CycleError>(),
        Some(CycleError::MissingData(_))
    ));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let config = ReportConfig {
        cards_per_campaign: 0,
        ..ReportConfig::default()
    };
    let error = ReportPipeline::new(config)
        .err()
        .expect("invalid config");
    assert!(matches!(
        error.downcast_ref::<CycleError>(),
        Some(CycleError::InvalidConfiguration(_))
    ));
}

#[test]
fn forced_meta_overrides_inference() {
    let config = ReportConfig {
        force_channel: Some("display".to_string()),
        force_brand: Some("non".to_string()),
        ..ReportConfig::default()
    };
    let pipeline = ReportPipeline::new(config).expect("pipeline");
    let prepared = pipeline.prepare(&inputs(), today()).expect("prepared");
    assert_eq!(prepared.campaigns[0].meta, CampaignMeta::new("display", "non"));
}
