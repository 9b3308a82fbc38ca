use super::{ChatTurn, CompletionClient, CompletionFuture};
use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Completion client for an OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, system_prompt: &str, turns: &[ChatTurn], max_tokens: u32) -> CompletionFuture {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let api_key = self.config.api_key.clone();
        let http = self.http.clone();

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(WireMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
        for turn in turns {
            messages.push(WireMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            });
        }
        let body = CompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens,
        };

        Box::pin(async move {
            let response = http.post(&url).bearer_auth(&api_key).json(&body).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                return Err(AppError::Upstream(format!(
                    "completion request failed with status {status}: {detail}"
                )));
            }

            let parsed: CompletionResponse = response.json().await?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default();
            if content.is_empty() {
                return Err(AppError::Upstream(
                    "Empty response from completion service".to_string(),
                ));
            }
            Ok(content)
        })
    }
}
