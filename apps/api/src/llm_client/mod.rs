/// LLM Client — the single point of entry for all chat-completion calls.
///
/// ARCHITECTURAL RULE: No other module may call the provider API directly.
/// All LLM interactions MUST go through this module.
///
/// Speaks the OpenAI-compatible chat-completions protocol (Groq by default).
/// Model and temperature are chosen per call through `ModelSettings`.
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No LLM API key provided")]
    MissingCredentials,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Which model to call and how creative it may be.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    /// Text of the first choice, if it has any non-blank content.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Wraps the chat-completions API with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_tokens,
        }
    }

    /// Same connection pool, different key (for callers that bring their own).
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        Self {
            api_key: Some(api_key).filter(|k| !k.trim().is_empty()),
            ..self.clone()
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Makes a raw chat-completions call, returning the full response object.
    /// Retries on 429 (rate limit), 5xx and transport errors with exponential backoff.
    pub async fn call(
        &self,
        settings: &ModelSettings,
        prompt: &str,
        system: &str,
    ) -> Result<LlmResponse, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingCredentials)?;
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = ChatRequest {
            model: &settings.model,
            max_tokens: self.max_tokens,
            temperature: settings.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = retry_delay(attempt);
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: api_error_message(body),
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            if let Some(usage) = &llm_response.usage {
                debug!(
                    model = %settings.model,
                    "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                    usage.prompt_tokens, usage.completion_tokens
                );
            }

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Calls the LLM and returns the trimmed text of the first choice.
    pub async fn call_text(
        &self,
        settings: &ModelSettings,
        prompt: &str,
        system: &str,
    ) -> Result<String, LlmError> {
        let response = self.call(settings, prompt, system).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;
        Ok(text.trim().to_string())
    }

    /// Calls the LLM and deserializes the text response as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        settings: &ModelSettings,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let response = self.call(settings, prompt, system).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;
        parse_json_reply(text)
    }
}

/// Parses a model reply as JSON, tolerating prose around it and Markdown code fences.
pub(crate) fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    serde_json::from_str(json_payload(text)).map_err(LlmError::Parse)
}

/// Exponential backoff before the given attempt: 1s, then 2s.
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(1000 * (1 << (attempt - 1)))
}

/// Longest a single `call_text`/`call_json` can take when every attempt runs
/// into `request_timeout`, backoff included.
pub fn retry_budget(request_timeout: Duration) -> Duration {
    (1..MAX_RETRIES).map(retry_delay).sum::<Duration>() + request_timeout * MAX_RETRIES
}

fn api_error_message(body: String) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

/// Locates the JSON in a model reply: the first fenced block wherever it
/// appears, else the outermost `{...}` span, else the trimmed text.
fn json_payload(text: &str) -> &str {
    let text = text.trim();
    if let Some(block) = fenced_block(text) {
        return block;
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Body of the first ``` fence, without its language tag. An unterminated
/// fence runs to the end of the text.
fn fenced_block(text: &str) -> Option<&str> {
    let (_, after_open) = text.split_once("```")?;
    let body = match after_open.split_once('\n') {
        Some((tag, rest)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => rest,
        _ => after_open,
    };
    let body = body.split_once("```").map_or(body, |(inner, _)| inner);
    Some(body.trim())
}
