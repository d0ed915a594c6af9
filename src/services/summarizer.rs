//! Summary provider for file content.
//!
//! Uses an OpenAI-compatible Chat Completions API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OpenAiSettings;
use crate::error::{AppError, AppResult};

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Generate a brief, concise overview (2-3 sentences) of the provided file content. Focus on the purpose and key elements of the file.";

/// Turns text into a short summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text`. An empty answer is an error, not an empty summary.
    async fn summarize(&self, text: &str) -> AppResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the summary text out of a completion.
fn extract_summary(response: ChatCompletionResponse) -> AppResult<String> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        AppError::SummarizationFailed("no choices returned from provider".to_string())
    })?;

    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(AppError::SummarizationFailed(
            "provider returned an empty summary".to_string(),
        )),
    }
}

/// Chat-completions client.
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    endpoint: String,
    model: String,
}

impl OpenAiSummarizer {
    pub fn new(settings: &OpenAiSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                AppError::SummarizationFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            endpoint: completions_url(&settings.base_url),
            model: settings.model.clone(),
        })
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, text: &str) -> AppResult<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        debug!(
            model = %self.model,
            input_chars = text.chars().count(),
            "Sending summary request"
        );

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            AppError::SummarizationFailed(format!("chat completion request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::SummarizationFailed(format!(
                "chat completion failed with status {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            AppError::SummarizationFailed(format!("invalid chat completion response: {}", e))
        })?;

        extract_summary(parsed)
    }
}
