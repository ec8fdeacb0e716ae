use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent vocabulary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry of the configured intent vocabulary. The planner feeds the
/// whole vocabulary to the classifier prompt and maps the winning intent
/// to `suggested_agents` when building the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSpec {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "d_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Team names this intent routes to, in dependency order.
    #[serde(default)]
    pub suggested_agents: Vec<String>,
    #[serde(default)]
    pub priority: u8,
    /// Standard task label used for the step stub of each suggested team.
    #[serde(default)]
    pub task_labels: std::collections::HashMap<String, String>,
    /// Strategy override; when absent the planner decides from the
    /// dependency policy.
    #[serde(default)]
    pub execution_strategy: Option<crate::plan::ExecutionStrategy>,
}

fn d_confidence_threshold() -> f64 {
    0.5
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Planner knobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Below this classifier confidence, the intent reclassifies to
    /// `unclear`.
    #[serde(default = "d_confidence_floor")]
    pub confidence_floor: f64,
    /// Intents that skip execution entirely and go straight to respond.
    #[serde(default = "d_short_circuit")]
    pub short_circuit_intents: Vec<String>,
    /// Intents whose queries are decomposed into sub-queries first.
    #[serde(default = "d_decompose")]
    pub decompose_intents: Vec<String>,
    /// Per-team time estimate used for `estimated_total_time_s`.
    #[serde(default = "d_team_estimate_s")]
    pub team_estimate_s: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            confidence_floor: d_confidence_floor(),
            short_circuit_intents: d_short_circuit(),
            decompose_intents: d_decompose(),
            team_estimate_s: d_team_estimate_s(),
        }
    }
}

fn d_confidence_floor() -> f64 {
    0.5
}

fn d_short_circuit() -> Vec<String> {
    vec!["irrelevant".into(), "unclear".into()]
}

fn d_decompose() -> Vec<String> {
    vec!["comprehensive".into()]
}

fn d_team_estimate_s() -> u32 {
    15
}
