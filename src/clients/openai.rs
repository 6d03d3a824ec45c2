use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::CycleError;
use crate::pipeline::TextGenerator;
use crate::pipeline::prompt::GenerationRequest;

const SERVICE: &str = "openai";

/// OpenAI-compatible chat completions endpoint.
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(client: Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl TextGenerator for ChatCompletionsClient {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let payload = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        info!(model = %request.model, endpoint = %self.endpoint, "requesting completion");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|error| CycleError::external(SERVICE, error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|error| CycleError::external(SERVICE, error.to_string()))?;
        if !status.is_success() {
            return Err(CycleError::external(
                SERVICE,
                format!("status {status} body {}", body.trim()),
            )
            .into());
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&body).context("parsing completion response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| CycleError::external(SERVICE, "response carried no message content"))?;

        debug!(chars = content.chars().count(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;
    use crate::clients::http_client;

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "gpt-4o-mini".to_string(),
            system: "system".to_string(),
            user: "user prompt".to_string(),
            temperature: 0.2,
            max_tokens: 900,
        }
    }

    #[test]
    fn posts_one_chat_request_and_returns_trimmed_content() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test")
                .json_body(json!({
                    "model": "gpt-4o-mini",
                    "messages": [
                        { "role": "system", "content": "system" },
                        { "role": "user", "content": "user prompt" },
                    ],
                    "temperature": 0.2,
                    "max_tokens": 900,
                }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "\n✅ 進捗\n" } }]
                }));
        });

        let client = ChatCompletionsClient::new(
            http_client().expect("client"),
            &server.url("/v1/chat/completions"),
            "sk-test",
        );
        let content = client.generate(&request()).expect("completion");
        assert_eq!(content, "✅ 進捗");
        mock.assert_hits(1);
    }

    #[test]
    fn error_status_is_an_external_failure() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500).body("upstream exploded");
        });

        let client = ChatCompletionsClient::new(
            http_client().expect("client"),
            &server.url("/v1/chat/completions"),
            "sk-test",
        );
        let error = client.generate(&request()).expect_err("500");
        assert!(matches!(
            error.downcast_ref::<CycleError>(),
            Some(CycleError::ExternalService { service: "openai", .. })
        ));
        assert!(error.to_string().contains("upstream exploded"));
        mock.assert();
    }

    #[test]
    fn empty_choices_are_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({ "choices": [] }));
        });

        let client = ChatCompletionsClient::new(
            http_client().expect("client"),
            &server.url("/v1/chat/completions"),
            "sk-test",
        );
        assert!(client.generate(&request()).is_err());
    }
}
