use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;

use super::guardrail::{NumericAllowList, ResultsBlock};
use super::style::StyleGuide;
use crate::config::ReportConfig;
use crate::model::{CampaignMeta, CardSummary, IssueTag};

pub const SYSTEM_PROMPT: &str = "あなたは日本語のマーケアナリストです。\
前向き・建設的なトーンを基本に、直近週を主役にして簡潔にレポートします。\
出力は構成テンプレート・表記ルールに準拠し、余計な見出しは追加しないこと。\
例文は参照のみ。文言のコピーは禁止。\
数値は集計表・許可リスト由来のみ、許可値以外は出力しないこと。";

const DEFAULT_PHRASING_RULES: [&str; 5] = [
    "箇条書きは行頭に『 • 』（半角スペース+中黒）",
    "見出しは『:white_check_mark: 進捗 :』『:warning: 課題 :』『:dash: ネクストアクション』『:chart_with_upwards_trend: 結果』の4つのみ",
    "金額は¥+3桁カンマ、割合は%で小数2桁まで",
    "CV=0のCPAは—表記、前週比較は()内の『前週 : 』表記",
    "出力内で『\\n』は使わず実改行で段落化",
];

/// Issues, meta and ranked cards for one latest-period campaign.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignContext {
    pub name: String,
    pub issues: Vec<IssueTag>,
    pub meta: CampaignMeta,
    pub ref_cards: Vec<CardSummary>,
}

/// One chat completion request; sent exactly once per cycle.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

pub struct PromptInputs<'a> {
    pub style: &'a StyleGuide,
    pub results: &'a ResultsBlock,
    pub allow_list: &'a NumericAllowList,
    pub campaigns: &'a [CampaignContext],
    pub metrics_tsv: &'a str,
}

pub fn assemble_prompt(inputs: &PromptInputs<'_>, config: &ReportConfig) -> Result<GenerationRequest> {
    let phrasing_rules = if inputs.style.phrasing_rules.is_empty() {
        DEFAULT_PHRASING_RULES.iter().map(|rule| rule.to_string()).collect()
    } else {
        inputs.style.phrasing_rules.clone()
    };
    let phrasing_json =
        serde_json::to_string(&phrasing_rules).context("failed to serialize phrasing rules")?;
    let cards_json = serde_json::to_string_pretty(&json!({ "campaigns": inputs.campaigns }))
        .context("failed to serialize campaign knowledge")?;

    let exemplars = inputs
        .style
        .exemplars
        .iter()
        .map(|exemplar| format!("({}/{})\n{}", exemplar.style_id, exemplar.recency, exemplar.text))
        .collect::<Vec<String>>()
        .join("\n\n");

    let mut user = String::new();
    user.push_str("あなたは日本語で、前向きで建設的なトーンを基本にレポートを書くアナリストです。\n");
    user.push_str("数字の推測・創作は禁止。数値は必ず下記の集計表または『数値許可リスト』に含まれる値のみを使用すること。\n\n");

    user.push_str("【文体ガイド（厳守）】\n構成テンプレート：\n");
    user.push_str(&inputs.style.structure_template);
    user.push_str("\n\n見出しは『:white_check_mark: 進捗 :』『:warning: 課題 :』『:dash: ネクストアクション』『:chart_with_upwards_trend: 結果』の4つだけを、この表記のまま使うこと。\n");
    user.push_str("\n表記ルール：");
    user.push_str(&phrasing_json);
    user.push_str("\n\n");

    user.push_str("【この文体の“参考”（コピペ禁止・内容はダミー化済み）】\n");
    user.push_str("例文の文言や構成をそのまま書き写さないこと。\n");
    user.push_str(&exemplars);
    user.push_str("\n\n");

    user.push_str("【数値ルール（重要）】\n");
    user.push_str("- 下記『固定KPI』は、そのまま貼り付け（並び替え・改変禁止）。\n");
    user.push_str("- それ以外のセクションで数値を記載する場合は、『数値許可リスト』に含まれる値のみを使用。含まれない数値は記載しない（「増加/減少」「高/低」など非数値で表現）。\n\n");

    user.push_str("# 固定KPI（このまま出力すること）\n");
    user.push_str(&inputs.results.text());
    user.push_str("\n\n");

    user.push_str("# 数値許可リスト（上記KPIや表に含まれる数値のみ使用可）\n");
    user.push_str(&inputs.allow_list.tokens().join(", "));
    user.push_str("\n\n");

    user.push_str("# 参照カード（JSON; 各キャンペーンの課題カテゴリと知見カード）\n");
    user.push_str(&cards_json);
    user.push_str("\n\n");

    user.push_str(&format!(
        "# データ（直近{}週間、タブ区切りTSV。最新週を主に使う）\n",
        config.lookback_weeks
    ));
    user.push_str(inputs.metrics_tsv);

    Ok(GenerationRequest {
        model: config.model.clone(),
        system: SYSTEM_PROMPT.to_string(),
        user: user.trim().to_string(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;
    use crate::pipeline::guardrail::{NumericTokenExtractor, build_allow_list};
    use crate::pipeline::style::MaskedExemplar;

    fn results() -> ResultsBlock {
        ResultsBlock {
            heading: ":chart_with_upwards_trend: 結果".to_string(),
            body: vec![" • 全体 : CPA¥15,000、CV8、Cost¥120,000".to_string()],
        }
    }

    fn allow_list(block: &ResultsBlock) -> NumericAllowList {
        let extractor = NumericTokenExtractor::new().expect("extractor");
        build_allow_list(&extractor, block, &[], 300, 3000)
    }

    fn campaigns() -> Vec<CampaignContext> {
        vec![CampaignContext {
            name: "Brand-A".to_string(),
            issues: vec![IssueTag::CpaUp],
            meta: CampaignMeta::new("search", "brand"),
            ref_cards: vec![CardSummary {
                title: "入札見直し".to_string(),
                key_takeaways: "tCPA を調整".to_string(),
                checklist: vec!["除外KW".to_string()],
                source: SourceKind::Report,
                recency: "2025-09-01".to_string(),
            }],
        }]
    }

    #[test]
    fn request_carries_every_input_and_instruction() {
        let block = results();
        let allow_list = allow_list(&block);
        let mut style = StyleGuide::fallback();
        style.exemplars.push(MaskedExemplar {
            style_id: "weekly-a".to_string(),
            recency: "2025-08-01".to_string(),
            text: ":warning: 課題 :\n • <例>".to_string(),
        });
        let campaigns = campaigns();
        let config = ReportConfig::default();
        let request = assemble_prompt(
            &PromptInputs {
                style: &style,
                results: &block,
                allow_list: &allow_list,
                campaigns: &campaigns,
                metrics_tsv: "WeekStart\tWeekEnd",
            },
            &config,
        )
        .expect("prompt");

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.max_tokens, 900);
        assert_eq!(request.system, SYSTEM_PROMPT);
        assert!(request.user.contains(&block.text()));
        assert!(request.user.contains("15,000, 8, ¥120,000"));
        assert!(request.user.contains("そのまま貼り付け"));
        assert!(request.user.contains("『数値許可リスト』に含まれる値のみ"));
        assert!(request.user.contains("コピペ禁止"));
        assert!(request.user.contains("4つだけ"));
        assert!(request.user.contains("(weekly-a/2025-08-01)\n:warning: 課題 :\n • <例>"));
        assert!(request.user.contains("\"CPA_UP\""));
        assert!(request.user.contains("\"ref_cards\""));
        assert!(request.user.contains("直近4週間"));
        assert!(request.user.ends_with("WeekStart\tWeekEnd"));
        assert!(request.user.contains("箇条書きは行頭に"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let block = results();
        let allow_list = allow_list(&block);
        let style = StyleGuide::fallback();
        let campaigns = campaigns();
        let inputs = PromptInputs {
            style: &style,
            results: &block,
            allow_list: &allow_list,
            campaigns: &campaigns,
            metrics_tsv: "",
        };
        let config = ReportConfig::default();
        let first = assemble_prompt(&inputs, &config).expect("prompt");
        let second = assemble_prompt(&inputs, &config).expect("prompt");
        assert_eq!(first.user, second.user);
    }

    #[test]
    fn template_rules_replace_the_defaults() {
        let block = results();
        let allow_list = allow_list(&block);
        let mut style = StyleGuide::fallback();
        style.phrasing_rules = vec!["体言止めを使う".to_string()];
        let request = assemble_prompt(
            &PromptInputs {
                style: &style,
                results: &block,
                allow_list: &allow_list,
                campaigns: &[],
                metrics_tsv: "",
            },
            &ReportConfig::default(),
        )
        .expect("prompt");
        assert!(request.user.contains("[\"体言止めを使う\"]"));
        assert!(!request.user.contains("箇条書きは行頭に"));
    }
}
