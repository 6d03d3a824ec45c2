use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;

use super::headings::HeadingGrammar;
use super::lenient::{age_in_days, unescape_newlines};
use crate::config::StyleWeights;
use crate::model::{CampaignMeta, StyleTemplate};

pub const MASK_PLACEHOLDER: &str = "<例>";

pub const FALLBACK_STRUCTURE: &str = ":white_check_mark: 進捗 :
 • <1〜3行のポジティブ要点>

:warning: 課題 :
 • <本当にクリティカルな点がある場合のみ>

:dash: ネクストアクション
 • <即実行×インパクト高い順に2〜4件>

:chart_with_upwards_trend: 結果
 • 全体 : CPA¥<num>、CV<num>、Cost¥<num>
 • <キャンペーン> : CPA¥<num>、CV<num>、Cost¥<num>（前週 : CPA¥<num>、CV<num>、Cost¥<num>）";

#[derive(Debug, Clone, Serialize)]
pub struct MaskedExemplar {
    pub style_id: String,
    pub recency: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StyleGuide {
    pub structure_template: String,
    pub phrasing_rules: Vec<String>,
    pub exemplars: Vec<MaskedExemplar>,
    pub fallback: bool,
}

impl StyleGuide {
    pub fn fallback() -> Self {
        Self {
            structure_template: FALLBACK_STRUCTURE.to_string(),
            phrasing_rules: Vec::new(),
            exemplars: Vec::new(),
            fallback: true,
        }
    }
}

pub fn score_template(
    template: &StyleTemplate,
    meta: &CampaignMeta,
    today: NaiveDate,
    weights: &StyleWeights,
) -> f64 {
    let mut score = template.priority.unwrap_or(weights.default_priority);
    if meta.channel.as_deref() == Some(template.channel.as_str()) {
        score += weights.channel_match;
    }
    if meta.brand.as_deref() == Some(template.brand.as_str()) {
        score += weights.brand_match;
    }
    if age_in_days(template.recency, today) < weights.recent_window_days {
        score += weights.recent_bonus;
    }
    score
}

/// Best template supplies the structure; the top `max_exemplars` supply
/// masked examples.
pub fn select_style(
    templates: &[StyleTemplate],
    meta: &CampaignMeta,
    today: NaiveDate,
    max_exemplars: usize,
    weights: &StyleWeights,
    grammar: &HeadingGrammar,
) -> StyleGuide {
    if templates.is_empty() {
        return StyleGuide::fallback();
    }

    let mut scored = templates
        .iter()
        .enumerate()
        .map(|(index, template)| (index, score_template(template, meta, today, weights), template))
        .collect::<Vec<(usize, f64, &StyleTemplate)>>();
    scored.sort_by(|left, right| {
        right
            .1
            .partial_cmp(&left.1)
            .unwrap_or(Ordering::Equal)
            .then(left.0.cmp(&right.0))
    });

    let top = scored[0].2;
    let exemplars = scored
        .iter()
        .take(max_exemplars)
        .map(|(_, _, template)| MaskedExemplar {
            style_id: template.style_id.clone(),
            recency: template.recency_raw.clone(),
            text: mask_exemplar(&template.exemplar_text, grammar),
        })
        .collect();

    StyleGuide {
        structure_template: unescape_newlines(&template_or_fallback(&top.structure_template)),
        phrasing_rules: top.phrasing_rules.clone(),
        exemplars,
        fallback: false,
    }
}

fn template_or_fallback(structure: &str) -> String {
    if structure.trim().is_empty() {
        FALLBACK_STRUCTURE.to_string()
    } else {
        structure.to_string()
    }
}

/// Keeps only the shape of an exemplar: headings, bullet prefixes, blanks.
pub fn mask_exemplar(text: &str, grammar: &HeadingGrammar) -> String {
    let unescaped = unescape_newlines(text).replace("\r\n", "\n");

    let mut masked = unescaped
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                return String::new();
            }
            if grammar.is_heading(line) {
                return line.trim().to_string();
            }
            if grammar.has_bullet(line) {
                let content = grammar.strip_bullet(line);
                let prefix = &line[..line.len() - content.len()];
                return format!("{prefix}{MASK_PLACEHOLDER}");
            }
            MASK_PLACEHOLDER.to_string()
        })
        .collect::<Vec<String>>()
        .join("\n");

    while masked.contains("\n\n\n") {
        masked = masked.replace("\n\n\n", "\n\n");
    }
    masked
}
