//! LLM gateway: a provider-agnostic chat/embeddings trait, an
//! OpenAI-compatible adapter, a retrying wrapper that enforces JSON mode,
//! a named prompt-template store, and a scripted mock for tests.

pub mod gateway;
pub mod mock;
pub mod openai_compat;
pub mod prompts;
pub mod traits;

pub use gateway::LlmGateway;
pub use mock::MockLlm;
pub use openai_compat::OpenAiCompatClient;
pub use prompts::PromptStore;
pub use traits::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, EmbeddingsRequest, EmbeddingsResponse,
    LlmClient, Usage,
};
