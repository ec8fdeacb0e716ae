//! Scripted mock client for tests.
//!
//! Responses are queued ahead of time and returned in order; every call
//! is recorded so tests can assert exactly which LLM tasks ran.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use zipsa_domain::error::{Error, Result};

use crate::traits::{
    ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmClient, Usage,
};

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Error(String),
}

/// A recorded chat call: the model asked for and the flattened prompt.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: Option<String>,
    pub json_mode: bool,
    pub prompt: String,
}

#[derive(Clone, Default)]
pub struct MockLlm {
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    embedding_dim: usize,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            embedding_dim: 8,
        }
    }

    /// Queue a plain-text response.
    pub fn push_text(&self, text: impl Into<String>) {
        self.queue.lock().push_back(Scripted::Text(text.into()));
    }

    /// Queue a JSON response (serialized before queuing).
    pub fn push_json(&self, value: serde_json::Value) {
        self.queue
            .lock()
            .push_back(Scripted::Text(value.to_string()));
    }

    /// Queue a failed call.
    pub fn push_error(&self, message: impl Into<String>) {
        self.queue.lock().push_back(Scripted::Error(message.into()));
    }

    /// Every chat call made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlm {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let prompt = req
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.calls.lock().push(RecordedCall {
            model: req.model.clone(),
            json_mode: req.json_mode,
            prompt,
        });

        let next = self.queue.lock().pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok(ChatResponse {
                content: text,
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 10,
                    total_tokens: 20,
                }),
                model: req.model.unwrap_or_else(|| "mock".into()),
            }),
            Some(Scripted::Error(message)) => Err(Error::Llm {
                model: req.model.unwrap_or_else(|| "mock".into()),
                message,
            }),
            None => Err(Error::Llm {
                model: req.model.unwrap_or_else(|| "mock".into()),
                message: "mock queue is empty".into(),
            }),
        }
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        // Deterministic pseudo-embeddings derived from byte sums.
        let embeddings = req
            .input
            .iter()
            .map(|text| {
                let seed = text.bytes().map(u64::from).sum::<u64>();
                (0..self.embedding_dim)
                    .map(|i| ((seed.wrapping_mul(i as u64 + 1)) % 1000) as f32 / 1000.0)
                    .collect()
            })
            .collect();
        Ok(EmbeddingsResponse { embeddings })
    }

    fn client_id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ChatMessage;

    #[tokio::test]
    async fn responses_come_back_in_order() {
        let mock = MockLlm::new();
        mock.push_text("one");
        mock.push_text("two");

        let req = |t: &str| ChatRequest {
            messages: vec![ChatMessage::user(t)],
            ..Default::default()
        };
        assert_eq!(mock.chat(req("a")).await.unwrap().content, "one");
        assert_eq!(mock.chat(req("b")).await.unwrap().content, "two");
        assert!(mock.chat(req("c")).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn embeddings_are_deterministic() {
        let mock = MockLlm::new();
        let req = EmbeddingsRequest {
            input: vec!["전세".into(), "전세".into()],
            model: None,
        };
        let resp = mock.embeddings(req).await.unwrap();
        assert_eq!(resp.embeddings.len(), 2);
        assert_eq!(resp.embeddings[0], resp.embeddings[1]);
    }
}
