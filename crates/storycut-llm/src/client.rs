//! Chat-completion client for an OpenAI-compatible provider.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LlmError, LlmResult};

/// Configuration for the LLM client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider API key. `None` means no credential is configured and every
    /// operation fails with `CredentialMissing`.
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// API base URL
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-5-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl LlmConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("STORYCUT_LLM_MODEL").unwrap_or_else(|_| "gpt-5-mini".to_string()),
            base_url: std::env::var("STORYCUT_LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        }
    }
}

/// Chat completion request.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// LLM provider client.
///
/// Completions are executed on the async runtime; there is no client-side
/// timeout on them (the provider's own bounds apply).
pub struct LlmClient {
    api_key: String,
    model: String,
    base_url: String,
    http: Client,
}

impl LlmClient {
    /// Create a new client. Fails immediately when no credential is
    /// configured; demo/mock behavior belongs to callers, never here.
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        let api_key = config.api_key.ok_or(LlmError::CredentialMissing)?;
        Ok(Self {
            api_key,
            model: config.model,
            base_url: config.base_url,
            http: Client::new(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> LlmResult<Self> {
        Self::new(LlmConfig::from_env())
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn messages(system: &str, user: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ]
    }

    /// Issue a blocking completion and return the full response text.
    pub async fn complete(&self, system: &str, user: &str) -> LlmResult<String> {
        self.complete_inner(system, user, None).await
    }

    /// Issue a blocking completion constrained to a JSON object response.
    pub async fn complete_json(&self, system: &str, user: &str) -> LlmResult<String> {
        self.complete_inner(
            system,
            user,
            Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        )
        .await
    }

    async fn complete_inner(
        &self,
        system: &str,
        user: &str,
        response_format: Option<ResponseFormat>,
    ) -> LlmResult<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: Self::messages(system, user),
            stream: None,
            response_format,
        };

        debug!(model = %self.model, "Issuing chat completion");

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::api(format!("provider returned {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::api(format!("failed to parse completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::api("no choices in completion response"))
    }

    /// Issue a streaming completion and yield content deltas as they arrive.
    ///
    /// The caller accumulates the full text; the stream ends at the
    /// provider's `[DONE]` marker or at connection close.
    pub async fn complete_streaming(
        &self,
        system: &str,
        user: &str,
    ) -> LlmResult<Pin<Box<dyn Stream<Item = LlmResult<String>> + Send>>> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: Self::messages(system, user),
            stream: Some(true),
            response_format: None,
        };

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::api(format!("provider returned {}: {}", status, body)));
        }

        let state = SseState {
            bytes: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            pending: VecDeque::new(),
            finished: false,
        };

        let stream = futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(text) = state.pending.pop_front() {
                    return Some((Ok(text), state));
                }
                if state.finished {
                    return None;
                }
                match state.bytes.next().await {
                    None => state.finished = true,
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((Err(LlmError::stream(e.to_string())), state));
                    }
                    Some(Ok(chunk)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                        state.drain_lines();
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

struct SseState {
    bytes: Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>,
    buffer: String,
    pending: VecDeque<String>,
    finished: bool,
}

impl SseState {
    /// Split buffered bytes into SSE lines and queue any content deltas.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.finished = true;
                return;
            }
            if let Some(delta) = extract_delta(data) {
                if !delta.is_empty() {
                    self.pending.push_back(delta);
                }
            }
        }
    }
}

/// Pull `choices[0].delta.content` out of one SSE data payload.
fn extract_delta(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}
