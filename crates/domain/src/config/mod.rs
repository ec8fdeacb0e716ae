mod intents;
mod llm;
mod memory;
mod prompts;
mod server;
mod store;
mod supervisor;
mod teams;

pub use intents::*;
pub use llm::*;
pub use memory::*;
pub use prompts::*;
pub use server::*;
pub use store::*;
pub use supervisor::*;
pub use teams::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The whole configuration tree, deserialized from one TOML file.
/// Intents, model mappings, memory limits, and supervisor knobs are all
/// data here — nothing of that vocabulary is compiled in.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub teams: TeamsConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    /// The intent vocabulary. Loaded, never compiled in.
    #[serde(default)]
    pub intents: Vec<IntentSpec>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the whole tree, returning every issue found.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        if self.intents.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "intents".into(),
                message: "no intents configured; the planner cannot classify queries".into(),
            });
        }

        for intent in &self.intents {
            if !(0.0..=1.0).contains(&intent.confidence_threshold) {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("intents.{}", intent.name),
                    message: format!(
                        "confidence_threshold {} outside [0,1]",
                        intent.confidence_threshold
                    ),
                });
            }
            for agent in &intent.suggested_agents {
                if crate::plan::Team::parse(agent).is_none() {
                    issues.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("intents.{}.suggested_agents", intent.name),
                        message: format!("unknown team \"{agent}\""),
                    });
                }
            }
        }

        for name in &self.planner.short_circuit_intents {
            if !self.intents.iter().any(|i| &i.name == name) {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "planner.short_circuit_intents".into(),
                    message: format!("intent \"{name}\" is not in the vocabulary"),
                });
            }
        }

        if self.memory.token_limit == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "memory.token_limit".into(),
                message: "token_limit must be positive".into(),
            });
        }

        if self.llm.models.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.models".into(),
                message: "no per-task model mappings; the default model serves every task".into(),
            });
        }

        if self.teams.max_revisions == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "teams.max_revisions".into(),
                message: "max_revisions of 0 disables the HITL modify loop".into(),
            });
        }

        issues
    }

    /// Look up an intent spec by name.
    pub fn intent(&self, name: &str) -> Option<&IntentSpec> {
        self.intents.iter().find(|i| i.name == name)
    }
}
