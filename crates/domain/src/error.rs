/// Shared error type used across all zipsa crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("LLM {model}: {message}")]
    Llm { model: String, message: String },

    #[error("store: {0}")]
    Store(String),

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("plan: {0}")]
    Plan(String),

    #[error("prompt template not found: {0}")]
    PromptNotFound(String),

    #[error("interrupt: {0}")]
    Interrupt(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
