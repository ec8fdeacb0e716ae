use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Team execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamsConfig {
    /// Soft deadline per team; exceeding it cancels in-flight tools and
    /// finalizes the team as failed with a timeout error.
    #[serde(default = "d_deadline_s")]
    pub deadline_s: u64,
    /// Document types requiring human approval before finalization.
    #[serde(default = "d_hitl_document_types")]
    pub hitl_document_types: Vec<String>,
    /// Bound on the HITL modify loop; past it, modify acts as approve.
    #[serde(default = "d_max_revisions")]
    pub max_revisions: u32,
    /// How long a pending interrupt may wait before it expires with the
    /// session.
    #[serde(default = "d_interrupt_timeout_s")]
    pub interrupt_timeout_s: u64,
    /// Data-reuse window: team outputs from the last N runs of the same
    /// session are eligible for reuse.
    #[serde(default = "d_reuse_window")]
    pub reuse_window: usize,
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self {
            deadline_s: d_deadline_s(),
            hitl_document_types: d_hitl_document_types(),
            max_revisions: d_max_revisions(),
            interrupt_timeout_s: d_interrupt_timeout_s(),
            reuse_window: d_reuse_window(),
        }
    }
}

fn d_deadline_s() -> u64 {
    60
}

fn d_hitl_document_types() -> Vec<String> {
    vec!["lease_contract".into(), "sales_contract".into()]
}

fn d_max_revisions() -> u32 {
    3
}

fn d_interrupt_timeout_s() -> u64 {
    1_800
}

fn d_reuse_window() -> usize {
    5
}
