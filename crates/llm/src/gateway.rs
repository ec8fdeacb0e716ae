//! The retrying LLM gateway the runtime calls.
//!
//! `LlmGateway` wraps a `dyn LlmClient` with bounded retry + exponential
//! back-off, resolves the per-task model mapping from configuration, and
//! enforces JSON mode: a JSON-mode call parses the response and retries
//! when the model returned something that is not a JSON object.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use zipsa_domain::config::LlmConfig;
use zipsa_domain::error::{Error, Result};

use crate::traits::{ChatMessage, ChatRequest, EmbeddingsRequest, LlmClient};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LlmGateway {
    client: Arc<dyn LlmClient>,
    config: LlmConfig,
}

impl LlmGateway {
    pub fn new(client: Arc<dyn LlmClient>, config: LlmConfig) -> Self {
        Self { client, config }
    }

    /// The model configured for a named task (intent_analysis,
    /// keyword_extraction, tool_selection_search, response_synthesis, …).
    pub fn model_for(&self, task: &str) -> String {
        self.config.model_for(task).to_string()
    }

    /// Plain-text chat completion for a named task.
    pub async fn chat_text(&self, task: &str, messages: Vec<ChatMessage>) -> Result<String> {
        let req = ChatRequest {
            messages,
            temperature: Some(self.config.temperature),
            max_tokens: None,
            json_mode: false,
            model: Some(self.model_for(task)),
        };
        let resp = self.chat_with_retry(task, req).await?;
        Ok(resp)
    }

    /// JSON-mode chat completion for a named task. The response must be a
    /// JSON object; a non-object response counts as a failed attempt and
    /// is retried like a transport error.
    pub async fn chat_json(&self, task: &str, messages: Vec<ChatMessage>) -> Result<Value> {
        let model = self.model_for(task);
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }

            let req = ChatRequest {
                messages: messages.clone(),
                temperature: Some(self.config.temperature),
                max_tokens: None,
                json_mode: true,
                model: Some(model.clone()),
            };

            match self.client.chat(req).await {
                Ok(resp) => match coerce_json_object(&resp.content) {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        tracing::warn!(
                            task,
                            attempt,
                            error = %e,
                            "JSON-mode response was not a JSON object; retrying"
                        );
                        last_err = Some(e);
                    }
                },
                Err(e) => {
                    tracing::warn!(task, attempt, error = %e, "LLM call failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Llm {
            model,
            message: format!("{task}: all retries exhausted"),
        }))
    }

    /// Text embeddings with the same retry envelope.
    pub async fn embed(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }
            let req = EmbeddingsRequest {
                input: input.clone(),
                model: Some(self.config.embedding_model.clone()),
            };
            match self.client.embeddings(req).await {
                Ok(resp) => return Ok(resp.embeddings),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "embeddings call failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Other("embeddings: all retries exhausted".into())))
    }

    async fn chat_with_retry(&self, task: &str, req: ChatRequest) -> Result<String> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }
            match self.client.chat(req.clone()).await {
                Ok(resp) => return Ok(resp.content),
                Err(e) => {
                    tracing::warn!(task, attempt, error = %e, "LLM call failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Other(format!("{task}: all retries exhausted"))))
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(attempt.saturating_sub(1)))
}

/// Parse the model output as a JSON object. Models occasionally wrap the
/// object in prose or a code fence even in JSON mode; extract the first
/// top-level `{…}` before giving up.
fn coerce_json_object(content: &str) -> Result<Value> {
    let trimmed = content.trim();
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(v);
            }
        }
    }

    Err(Error::Other(format!(
        "expected a JSON object, got: {}",
        &trimmed.chars().take(120).collect::<String>()
    )))
}
