//! Chat-completion client for OpenAI-compatible providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::agent::decode::extract_json_object;
use crate::config::LlmConfig;
use crate::error::TaskError;
use crate::retry::{retry_with_backoff, AttemptError, RetryError, RetryErrorKind, RetryPolicy, Retryable};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest provider error body kept in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 200;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Request rejected ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_)
                | LlmError::Timeout
                | LlmError::RateLimited(_)
                | LlmError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Decode(e.to_string())
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

/// A single system + user prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Anything that can answer a chat prompt with text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

// ─── OpenAI-compatible client ───────────────────────────────────────────────

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    http: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: SecretString,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: SecretString) -> Result<Self, LlmError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Client(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = CompletionBody {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Decode("response contained no message content".to_string()))
    }
}

fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let body = truncate_body(body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited(body)
    } else if status.is_server_error() {
        LlmError::Server {
            status: status.as_u16(),
            body,
        }
    } else {
        LlmError::Api {
            status: status.as_u16(),
            body,
        }
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}

// ─── Prompt runner ──────────────────────────────────────────────────────────

/// Sends prompts for an agent and decodes the reply into a JSON object.
///
/// Only the remote call is retried. Decoding happens once, on the final
/// reply, so a malformed answer is never retried.
#[derive(Clone)]
pub struct PromptRunner {
    client: Option<Arc<dyn LlmClient>>,
    policy: RetryPolicy,
}

impl PromptRunner {
    pub fn new(client: Option<Arc<dyn LlmClient>>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub async fn run_json(
        &self,
        agent: &str,
        request: ChatRequest,
    ) -> Result<serde_json::Value, TaskError> {
        let client = self.client.clone().ok_or_else(|| {
            TaskError::Configuration(format!(
                "{} requires an LLM client. Configure provider credentials.",
                agent
            ))
        })?;

        let raw = retry_with_backoff(&self.policy, LlmError::is_retryable, |attempt| {
            let client = Arc::clone(&client);
            let request = request.clone();
            async move {
                log::debug!("{}: LLM call attempt {}", agent, attempt);
                client.complete(&request).await
            }
        })
        .await
        .map_err(task_error_from_retry)?;

        extract_json_object(&raw)
    }
}

fn task_error_from_retry(err: RetryError<LlmError>) -> TaskError {
    match (err.kind(), &err.source) {
        (RetryErrorKind::Timeout, AttemptError::TimedOut(limit)) => TaskError::Timeout {
            seconds: limit.as_secs_f64(),
        },
        (RetryErrorKind::Transient, _) | (RetryErrorKind::Timeout, _) => {
            TaskError::Transient(err.to_string())
        }
        (RetryErrorKind::Permanent, _) => TaskError::Failed(err.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and counts calls.
    pub struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedClient {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            })
        }

        pub fn replying(reply: &str) -> Arc<Self> {
            Self::new(vec![Ok(reply.to_string())])
        }

        pub fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Api {
                    status: 400,
                    body: "no scripted reply left".to_string(),
                }))
        }
    }

    pub fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: 0.0,
            attempt_timeout: Some(Duration::from_secs(5)),
        }
    }
}
