use tracing::debug;

use super::baseline::{BaselineSet, Status, evaluate};
use crate::model::{IssueTag, Metric, MetricRow};

/// Issue tags for one campaign row, in metric order, without duplicates.
pub fn classify_issues(row: &MetricRow, baselines: &BaselineSet) -> Vec<IssueTag> {
    let volume = row.volume();
    let mut issues = Vec::<IssueTag>::new();

    for metric in Metric::ALL {
        let Some(rule) = baselines.resolve(&row.campaign, metric) else {
            continue;
        };

        // Under-volume metrics are left out entirely rather than reported.
        if rule.volume_unmet(&volume) {
            debug!(
                campaign = %row.campaign,
                metric = metric.as_str(),
                "skipping metric below volume floor"
            );
            continue;
        }

        let status = evaluate(row.value_of(metric), &rule, &volume);
        debug!(
            campaign = %row.campaign,
            metric = metric.as_str(),
            status = status.as_str(),
            "evaluated metric"
        );
        if status == Status::Bad {
            let tag = metric.issue_tag();
            if !issues.contains(&tag) {
                issues.push(tag);
            }
        }
    }

    issues
}
