use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What to do with a run whose channel closed mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Write a checkpoint with phase `interrupted` for later replay.
    #[default]
    Checkpoint,
    /// Drop the run state.
    Discard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "d_true")]
    pub enable_checkpointing: bool,
    /// Upper bound on graph re-entries (HITL modify loops included).
    #[serde(default = "d_max_recursion")]
    pub max_recursion: u32,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub on_disconnect: DisconnectPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enable_checkpointing: d_true(),
            max_recursion: d_max_recursion(),
            max_retries: d_max_retries(),
            on_disconnect: DisconnectPolicy::default(),
        }
    }
}

fn d_true() -> bool {
    true
}

fn d_max_recursion() -> u32 {
    25
}

fn d_max_retries() -> u32 {
    2
}
