//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Azure-hosted deployments behind a compatible proxy,
//! Ollama, vLLM, and any other endpoint that follows the OpenAI chat
//! completions contract. JSON mode is requested through
//! `response_format = {"type": "json_object"}`.

use serde_json::Value;

use zipsa_domain::config::LlmConfig;
use zipsa_domain::error::{Error, Result};

use crate::traits::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, EmbeddingsRequest, EmbeddingsResponse,
    LlmClient, Usage,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatClient {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Build the adapter from the shared [`LlmConfig`]. The API key env
    /// var is read once here; an unset var means an unauthenticated
    /// endpoint (local inference server).
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::info!(
                env = %cfg.api_key_env,
                "no LLM API key configured; requests go out unauthenticated"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            id: "openai_compat".into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.default_model.clone(),
            embedding_model: cfg.embedding_model.clone(),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut rb = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            rb = rb.header("Authorization", format!("Bearer {key}"));
        }
        rb
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

fn msg_to_openai(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    serde_json::json!({ "role": role, "content": msg.content })
}

fn parse_usage(body: &Value) -> Option<Usage> {
    let u = body.get("usage")?;
    Some(Usage {
        prompt_tokens: u.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: u.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: u.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&req);

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("chat completion ({model})"))
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Llm {
                model,
                message: format!("endpoint returned {status}: {payload}"),
            });
        }

        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Llm {
                model: model.clone(),
                message: "response has no message content".into(),
            })?
            .to_string();

        Ok(ChatResponse {
            content,
            usage: parse_usage(&payload),
            model,
        })
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.embedding_model.clone());
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "input": req.input,
        });

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("embeddings ({model})"))
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Llm {
                model,
                message: format!("endpoint returned {status}: {payload}"),
            });
        }

        let embeddings = payload
            .get("data")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        row.get("embedding").and_then(Value::as_array).map(|v| {
                            v.iter()
                                .filter_map(|x| x.as_f64().map(|f| f as f32))
                                .collect::<Vec<f32>>()
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if embeddings.len() != req.input.len() {
            return Err(Error::Llm {
                model,
                message: format!(
                    "embedding count mismatch: {} inputs, {} vectors",
                    req.input.len(),
                    embeddings.len()
                ),
            });
        }

        Ok(EmbeddingsResponse { embeddings })
    }

    fn client_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_includes_json_mode() {
        let cfg = LlmConfig::default();
        let client = OpenAiCompatClient::from_config(&cfg).unwrap();
        let req = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            json_mode: true,
            temperature: Some(0.1),
            ..Default::default()
        };
        let body = client.build_chat_body(&req);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["model"], cfg.default_model);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn chat_body_omits_optionals() {
        let cfg = LlmConfig::default();
        let client = OpenAiCompatClient::from_config(&cfg).unwrap();
        let req = ChatRequest {
            messages: vec![ChatMessage::system("s")],
            ..Default::default()
        };
        let body = client.build_chat_body(&req);
        assert!(body.get("response_format").is_none());
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn usage_parses_from_payload() {
        let payload = serde_json::json!({
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let usage = parse_usage(&payload).unwrap();
        assert_eq!(usage.total_tokens, 15);
    }
}
