use anyhow::Result;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::info;

use crate::error::CycleError;
use crate::pipeline::ReportSink;

const SERVICE: &str = "slack";

/// Slack-compatible incoming webhook.
pub struct SlackWebhook {
    client: Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

/// Plain-text header block followed by one mrkdwn section.
pub fn message_payload(title: &str, body: &str) -> Value {
    json!({
        "blocks": [
            { "type": "header", "text": { "type": "plain_text", "text": title } },
            { "type": "section", "text": { "type": "mrkdwn", "text": body } },
        ]
    })
}

impl ReportSink for SlackWebhook {
    fn deliver(&self, title: &str, body: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&message_payload(title, body))
            .send()
            .map_err(|error| CycleError::external(SERVICE, error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(CycleError::external(
                SERVICE,
                format!("status {status} body {}", text.trim()),
            )
            .into());
        }

        info!(chars = body.chars().count(), "posted report to webhook");
        Ok(())
    }
}
