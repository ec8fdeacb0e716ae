use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM gateway
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint base URL.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key. Empty key = unauthenticated
    /// endpoint (local inference server).
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Model used when a task has no mapping in `models`.
    #[serde(default = "d_default_model")]
    pub default_model: String,
    /// Embedding model for vector-search tools.
    #[serde(default = "d_embedding_model")]
    pub embedding_model: String,
    /// Per-task model mappings: intent_analysis, keyword_extraction,
    /// tool_selection_search, tool_selection_analysis, insight_generation,
    /// response_synthesis, conversation_summary.
    #[serde(default)]
    pub models: HashMap<String, String>,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            default_model: d_default_model(),
            embedding_model: d_embedding_model(),
            models: HashMap::new(),
            timeout_ms: d_timeout_ms(),
            max_retries: d_max_retries(),
            temperature: d_temperature(),
        }
    }
}

impl LlmConfig {
    /// Resolve the model for a named task, falling back to the default.
    pub fn model_for(&self, task: &str) -> &str {
        self.models
            .get(task)
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn d_api_key_env() -> String {
    "ZIPSA_LLM_API_KEY".into()
}

fn d_default_model() -> String {
    "gpt-4o-mini".into()
}

fn d_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn d_timeout_ms() -> u64 {
    30_000
}

fn d_max_retries() -> u32 {
    2
}

fn d_temperature() -> f32 {
    0.2
}
