use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tiered memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Sessions loaded with full transcripts.
    #[serde(default = "d_shortterm")]
    pub shortterm_limit: usize,
    /// Sessions loaded as summaries (mid band).
    #[serde(default = "d_midterm")]
    pub midterm_limit: usize,
    /// Sessions loaded as summaries (long band).
    #[serde(default = "d_longterm")]
    pub longterm_limit: usize,
    /// Hard budget over the running token sum of loaded records.
    #[serde(default = "d_token_limit")]
    pub token_limit: usize,
    /// Per-session message cap for short-term transcripts.
    #[serde(default = "d_message_limit")]
    pub message_limit: usize,
    /// Character cap for generated summaries.
    #[serde(default = "d_summary_max")]
    pub summary_max_length: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            shortterm_limit: d_shortterm(),
            midterm_limit: d_midterm(),
            longterm_limit: d_longterm(),
            token_limit: d_token_limit(),
            message_limit: d_message_limit(),
            summary_max_length: d_summary_max(),
        }
    }
}

fn d_shortterm() -> usize {
    3
}

fn d_midterm() -> usize {
    5
}

fn d_longterm() -> usize {
    10
}

fn d_token_limit() -> usize {
    8_000
}

fn d_message_limit() -> usize {
    20
}

fn d_summary_max() -> usize {
    500
}
