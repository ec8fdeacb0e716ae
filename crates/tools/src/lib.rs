//! Tool contract and registry.
//!
//! Every tool resolves to `{status, data?, error?}`; raised errors are
//! converted at the invocation wrapper, so a tool failure can never cross
//! the team boundary as a panic or an `Err`.

pub mod builtin;
pub mod registry;

use serde_json::Value;

use zipsa_domain::error::Result;
use zipsa_domain::team::ToolOutcome;

pub use registry::{InvokeRecord, ToolRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Metadata + trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Introspectable tool description, serialized into the tool-selection
/// prompt so the LLM can pick by name.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    /// Team tags this tool serves ("search", "analysis", "document").
    pub tags: Vec<String>,
    /// JSON Schema for the tool's inputs.
    pub input_schema: Value,
    /// Whether this tool's team output may be reused across runs when the
    /// input fingerprint matches.
    #[serde(default)]
    pub reuse_eligible: bool,
}

/// The capability every tool implements. Teams hold `Arc<dyn Tool>`
/// references resolved through the registry.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    /// Run the tool. Returning `Err` is allowed; the invocation wrapper
    /// converts it to a `status = error` outcome.
    async fn execute(&self, inputs: &Value) -> Result<ToolOutcome>;
}
