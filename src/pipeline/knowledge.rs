use std::cmp::Ordering;

use chrono::NaiveDate;
use regex::Regex;

use super::lenient::age_in_days;
use crate::config::RankingWeights;
use crate::model::{CampaignMeta, CardSummary, IssueTag, KnowledgeCard, SourceKind};

/// Guesses channel and brand from a campaign name.
pub struct MetaInference {
    display_pattern: Regex,
    brand_pattern: Regex,
}

impl MetaInference {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            display_pattern: Regex::new(r"(?i)display|gdn|youtube|video")?,
            brand_pattern: Regex::new(r"(?i)brand|指名|自社名")?,
        })
    }

    pub fn infer(&self, campaign: &str) -> CampaignMeta {
        let channel = if self.display_pattern.is_match(campaign) {
            "display"
        } else {
            "search"
        };
        let brand = if self.brand_pattern.is_match(campaign) {
            "brand"
        } else {
            "non"
        };
        CampaignMeta::new(channel, brand)
    }
}

/// Context for ranking cards against one campaign.
#[derive(Debug, Clone)]
pub struct RankingContext<'a> {
    pub issues: &'a [IssueTag],
    pub meta: &'a CampaignMeta,
    pub campaign: &'a str,
    pub today: NaiveDate,
    pub limit: usize,
}

/// Score of one card; `None` when its issue category is not current.
pub fn score_card(
    card: &KnowledgeCard,
    context: &RankingContext<'_>,
    weights: &RankingWeights,
) -> Option<f64> {
    let current = IssueTag::parse(&card.issue_category).is_some_and(|tag| context.issues.contains(&tag));
    if !current {
        return None;
    }

    let mut score = 0.0;
    if meta_field_matches(card.meta.channel.as_deref(), context.meta.channel.as_deref()) {
        score += weights.channel_match;
    }
    if meta_field_matches(card.meta.brand.as_deref(), context.meta.brand.as_deref()) {
        score += weights.brand_match;
    }
    if card
        .campaign_name
        .as_deref()
        .map(str::trim)
        .is_some_and(|name| !name.is_empty() && name == context.campaign)
    {
        score += weights.same_campaign;
    }

    score += card.quality_score.unwrap_or(weights.default_quality);

    if age_in_days(card.recency, context.today) < weights.recent_window_days {
        score += weights.recent_bonus;
    }
    if card.source == SourceKind::Report {
        score += weights.report_source;
    }

    let effect = card
        .outcome_effect
        .values()
        .map(|delta| delta.abs())
        .sum::<f64>();
    score += effect * weights.effect_multiplier;

    Some(score)
}

fn meta_field_matches(card_value: Option<&str>, current: Option<&str>) -> bool {
    match (card_value, current) {
        (Some(card_value), Some(current)) => !card_value.is_empty() && card_value == current,
        _ => false,
    }
}

/// Eligible cards by descending score, earliest input first on ties.
pub fn rank_cards(
    cards: &[KnowledgeCard],
    context: &RankingContext<'_>,
    weights: &RankingWeights,
) -> Vec<CardSummary> {
    if context.issues.is_empty() {
        return Vec::new();
    }

    let mut scored = cards
        .iter()
        .enumerate()
        .filter_map(|(index, card)| {
            score_card(card, context, weights).map(|score| (index, score, card))
        })
        .collect::<Vec<(usize, f64, &KnowledgeCard)>>();

    scored.sort_by(|left, right| {
        right
            .1
            .partial_cmp(&left.1)
            .unwrap_or(Ordering::Equal)
            .then(left.0.cmp(&right.0))
    });

    scored
        .into_iter()
        .take(context.limit)
        .map(|(_, _, card)| CardSummary {
            title: card.title.clone(),
            key_takeaways: card.key_takeaways.clone(),
            checklist: card.checklist.clone(),
            source: card.source,
            recency: card.recency_raw.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 1).expect("date")
    }

    fn card(title: &str, category: &str, source: SourceKind) -> KnowledgeCard {
        KnowledgeCard {
            title: title.to_string(),
            key_takeaways: format!("{title} takeaways"),
            checklist: vec!["check".to_string()],
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

    fn context<'a>(issues: &'a [IssueTag], meta: &'a CampaignMeta) -> RankingContext<'a> {
        RankingContext {
            issues,
            meta,
            campaign: "Brand-A",
            today: today(),
            limit: 3,
        }
    }

    #[test]
    fn score_sums_every_weight() {
        let meta = CampaignMeta::new("search", "non");
        let issues = [IssueTag::CpaUp];
        let mut full = card("full", "CPA_UP", SourceKind::Report);
        full.meta = CampaignMeta::new("search", "non");
        full.campaign_name = Some("Brand-A".to_string());
        full.quality_score = Some(70.0);
        full.recency = NaiveDate::from_ymd_opt(2025, 9, 1);
        full.outcome_effect = BTreeMap::from([("CPA".to_string(), -0.2), ("CV".to_string(), 0.1)]);

        let score = score_card(&full, &context(&issues, &meta), &RankingWeights::default())
            .expect("eligible");
        // 10 + 10 + 15 + 70 + 5 + 3 + 30 * 0.3
        assert!((score - 122.0).abs() < 1e-9);
    }

    #[test]
    fn cards_outside_the_issue_set_are_never_returned() {
        let meta = CampaignMeta::new("search", "non");
        let issues = [IssueTag::CtrDown];
        let cards = vec![
            card("cpa", "CPA_UP", SourceKind::Report),
            card("ctr", "CTR_DOWN", SourceKind::Doc),
        ];
        let ranked = rank_cards(&cards, &context(&issues, &meta), &RankingWeights::default());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].title, "ctr");
    }

    #[test]
    fn cpa_card_is_excluded_without_a_cpa_issue() {
        let meta = CampaignMeta::new("search", "non");
        let cards = vec![card("cpa", "CPA_UP", SourceKind::Report)];
        let ranked = rank_cards(&cards, &context(&[], &meta), &RankingWeights::default());
        assert!(ranked.is_empty());
    }

    #[test]
    fn ties_resolve_to_earlier_input() {
        let meta = CampaignMeta::default();
        let issues = [IssueTag::CpaUp];
        let cards = vec![
            card("first", "CPA_UP", SourceKind::Doc),
            card("second", "CPA_UP", SourceKind::Doc),
            card("third", "CPA_UP", SourceKind::Doc),
        ];
        let ranked = rank_cards(&cards, &context(&issues, &meta), &RankingWeights::default());
        let titles = ranked.iter().map(|c| c.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[test]
    fn higher_score_wins_and_limit_applies() {
        let meta = CampaignMeta::default();
        let issues = [IssueTag::CpaUp];
        let mut strong = card("strong", "CPA_UP", SourceKind::Doc);
        strong.quality_score = Some(90.0);
        let cards = vec![
            card("a", "CPA_UP", SourceKind::Doc),
            card("b", "CPA_UP", SourceKind::Report),
            strong,
            card("c", "CPA_UP", SourceKind::Doc),
        ];
        let mut ctx = context(&issues, &meta);
        ctx.limit = 2;
        let ranked = rank_cards(&cards, &ctx, &RankingWeights::default());
        let titles = ranked.iter().map(|c| c.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["strong", "b"]);
    }

    #[test]
    fn configurable_weights_change_the_order() {
        let meta = CampaignMeta::default();
        let issues = [IssueTag::CpaUp];
        let doc = card("doc", "CPA_UP", SourceKind::Doc);
        let mut report = card("report", "CPA_UP", SourceKind::Report);
        report.quality_score = Some(40.0);
        let cards = vec![doc, report];

        let default_order = rank_cards(&cards, &context(&issues, &meta), &RankingWeights::default());
        assert_eq!(default_order[0].title, "doc");

        let weights = RankingWeights {
            report_source: 20.0,
            ..RankingWeights::default()
        };
        let boosted = rank_cards(&cards, &context(&issues, &meta), &weights);
        assert_eq!(boosted[0].title, "report");
    }

    #[test]
    fn meta_inference_reads_campaign_names() {
        let inference = MetaInference::new().expect("patterns");
        assert_eq!(inference.infer("GDN_retarget"), CampaignMeta::new("display", "non"));
        assert_eq!(inference.infer("指名_検索"), CampaignMeta::new("search", "brand"));
        assert_eq!(inference.infer("Generic"), CampaignMeta::new("search", "non"));
    }
}
