use std::collections::HashMap;

use serde::Serialize;

use crate::model::{BaselineRule, Direction, Metric, Volume};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Good,
    Warn,
    Bad,
    Insufficient,
    Na,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Warn => "WARN",
            Self::Bad => "BAD",
            Self::Insufficient => "INSUFFICIENT",
            Self::Na => "NA",
        }
    }
}

impl BaselineRule {
    /// True when the rule sets a volume floor that `volume` does not reach.
    pub fn volume_unmet(&self, volume: &Volume) -> bool {
        (self.min_impressions > 0.0 && volume.impressions < self.min_impressions)
            || (self.min_clicks > 0.0 && volume.clicks < self.min_clicks)
            || (self.min_conversions > 0.0 && volume.conversions < self.min_conversions)
    }
}

/// Classifies one metric value against its rule.
pub fn evaluate(value: Option<f64>, rule: &BaselineRule, volume: &Volume) -> Status {
    let Some(value) = value.filter(|value| value.is_finite()) else {
        return Status::Na;
    };
    if rule.volume_unmet(volume) {
        return Status::Insufficient;
    }

    match rule.direction {
        Direction::LowerIsBetter => {
            if rule.good_max.is_some_and(|good| value <= good) {
                Status::Good
            } else if rule.bad_min.is_some_and(|bad| value >= bad) {
                Status::Bad
            } else {
                Status::Warn
            }
        }
        Direction::HigherIsBetter => {
            if rule.good_max.is_some_and(|good| value >= good) {
                Status::Good
            } else if rule.bad_min.is_some_and(|bad| value <= bad) {
                Status::Bad
            } else {
                Status::Warn
            }
        }
    }
}

pub fn default_rule(metric: Metric) -> Option<BaselineRule> {
    let (direction, good, bad, min_impressions) = match metric {
        Metric::Cpa => (Direction::LowerIsBetter, 15000.0, 20000.0, 100.0),
        Metric::Ctr => (Direction::HigherIsBetter, 0.03, 0.02, 1000.0),
        Metric::Cvr => (Direction::HigherIsBetter, 0.03, 0.02, 200.0),
        Metric::Cpc | Metric::Cv => return None,
    };

    Some(BaselineRule {
        metric,
        direction,
        target: Some(good),
        good_max: Some(good),
        bad_min: Some(bad),
        min_impressions,
        min_clicks: 0.0,
        min_conversions: 0.0,
    })
}

/// Global and per-campaign rules; lookups fall back to built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct BaselineSet {
    global: HashMap<Metric, BaselineRule>,
    per_campaign: HashMap<String, HashMap<Metric, BaselineRule>>,
}

impl BaselineSet {
    pub fn insert_global(&mut self, rule: BaselineRule) {
        self.global.insert(rule.metric, rule);
    }

    pub fn insert_for_campaign(&mut self, campaign: &str, rule: BaselineRule) {
        self.per_campaign
            .entry(campaign.to_string())
            .or_default()
            .insert(rule.metric, rule);
    }

    pub fn global_count(&self) -> usize {
        self.global.len()
    }

    pub fn campaign_override_count(&self) -> usize {
        self.per_campaign.values().map(HashMap::len).sum()
    }

    /// Per-campaign, then global, then the built-in default.
    pub fn resolve(&self, campaign: &str, metric: Metric) -> Option<BaselineRule> {
        self.per_campaign
            .get(campaign)
            .and_then(|rules| rules.get(&metric))
            .or_else(|| self.global.get(&metric))
            .cloned()
            .or_else(|| default_rule(metric))
    }
}
