use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors from the chat-completion API
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Model {model} is rate limited: {message}")]
    RateLimited { model: String, message: String },

    #[error("OpenAI API error ({status}): {body}")]
    Api { status: StatusCode, body: String },

    #[error("Failed to send request to OpenAI: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("OpenAI response contained no completion")]
    Empty,
}

impl CompletionError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CompletionError::RateLimited { .. })
    }
}

/// A single system + user chat completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: String,
    pub user: String,
}

/// Anything that can turn a prompt into completion text
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Adapter for the OpenAI chat-completions API
pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    api_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

impl OpenAiAdapter {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, CompletionError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            api_url: "https://api.openai.com/v1".to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Completer for OpenAiAdapter {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(prompt_bytes = request.user.len(), "Sending request to OpenAI API");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_error(&request.model, status, error_text));
        }

        let chat_response: ChatResponse = response.json().await?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(CompletionError::Empty)?;

        info!(bytes = content.len(), "Completion received");

        Ok(content)
    }
}

/// Map a non-success response to an error, recognising rate limiting by
/// status 429 or by the error code/type in the body
fn classify_error(model: &str, status: StatusCode, body: String) -> CompletionError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(&body).ok();

    let signalled = parsed.as_ref().is_some_and(|e| {
        e.error.code.as_deref() == Some("rate_limit_exceeded")
            || matches!(
                e.error.error_type.as_deref(),
                Some("rate_limit_error") | Some("requests")
            )
    });

    if status == StatusCode::TOO_MANY_REQUESTS || signalled {
        let message = parsed
            .map(|e| e.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.to_string());
        return CompletionError::RateLimited {
            model: model.to_string(),
            message,
        };
    }

    CompletionError::Api { status, body }
}
