//! Name → tool lookup with metadata introspection.
//!
//! Reads vastly outnumber writes: registration happens at boot (and on
//! admin reload), lookups happen on every team execution. Writes are
//! serialized through the `RwLock`; reads never block each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;

use zipsa_domain::team::ToolOutcome;

use crate::{Tool, ToolMetadata};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

/// The audited result of one tool invocation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InvokeRecord {
    pub tool: String,
    pub outcome: ToolOutcome,
    pub latency_ms: u64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a tool under its metadata name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.metadata().name.clone();
        tracing::info!(tool = %name, "registered tool");
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Metadata of every registered tool.
    pub fn list_metadata(&self) -> Vec<ToolMetadata> {
        let mut out: Vec<ToolMetadata> = self
            .tools
            .read()
            .values()
            .map(|t| t.metadata().clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Tools tagged for a team, name-sorted for deterministic prompts.
    pub fn tools_for_tag(&self, tag: &str) -> Vec<Arc<dyn Tool>> {
        let mut out: Vec<Arc<dyn Tool>> = self
            .tools
            .read()
            .values()
            .filter(|t| t.metadata().tags.iter().any(|t| t == tag))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.metadata().name.cmp(&b.metadata().name));
        out
    }

    /// Invoke a tool by name, converting every failure mode into a
    /// `status = error` outcome and stamping the latency.
    pub async fn invoke(&self, name: &str, inputs: &Value) -> InvokeRecord {
        let start = Instant::now();
        let outcome = match self.get(name) {
            Some(tool) => match tool.execute(inputs).await {
                Ok(outcome) => outcome,
                Err(e) => ToolOutcome::error(e.to_string()),
            },
            None => ToolOutcome::error(format!("unknown tool: {name}")),
        };
        InvokeRecord {
            tool: name.to_string(),
            outcome,
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipsa_domain::error::Error;

    struct Fixed {
        meta: ToolMetadata,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Tool for Fixed {
        fn metadata(&self) -> &ToolMetadata {
            &self.meta
        }
        async fn execute(&self, _inputs: &Value) -> zipsa_domain::error::Result<ToolOutcome> {
            if self.fail {
                Err(Error::Tool {
                    tool: self.meta.name.clone(),
                    message: "boom".into(),
                })
            } else {
                Ok(ToolOutcome::success(serde_json::json!({"ok": true})))
            }
        }
    }

    fn tool(name: &str, tag: &str, fail: bool) -> Arc<dyn Tool> {
        Arc::new(Fixed {
            meta: ToolMetadata {
                name: name.into(),
                description: format!("{name} tool"),
                tags: vec![tag.into()],
                input_schema: serde_json::json!({"type": "object"}),
                reuse_eligible: false,
            },
            fail,
        })
    }

    #[test]
    fn register_and_filter_by_tag() {
        let reg = ToolRegistry::new();
        reg.register(tool("legal_search", "search", false));
        reg.register(tool("market_data", "analysis", false));
        reg.register(tool("loan_search", "search", false));

        let search = reg.tools_for_tag("search");
        assert_eq!(search.len(), 2);
        // Deterministic name order.
        assert_eq!(search[0].metadata().name, "legal_search");
        assert_eq!(search[1].metadata().name, "loan_search");
        assert_eq!(reg.tools_for_tag("document").len(), 0);
    }

    #[tokio::test]
    async fn invoke_converts_errors_to_outcomes() {
        let reg = ToolRegistry::new();
        reg.register(tool("broken", "search", true));

        let rec = reg.invoke("broken", &serde_json::json!({})).await;
        assert!(!rec.outcome.is_success());
        assert!(rec.outcome.error.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_an_error_outcome() {
        let reg = ToolRegistry::new();
        let rec = reg.invoke("ghost", &serde_json::json!({})).await;
        assert!(!rec.outcome.is_success());
        assert!(rec.outcome.error.as_deref().unwrap().contains("unknown tool"));
    }

    #[test]
    fn replace_registration_wins() {
        let reg = ToolRegistry::new();
        reg.register(tool("legal_search", "search", true));
        reg.register(tool("legal_search", "search", false));
        assert_eq!(reg.len(), 1);
    }
}
