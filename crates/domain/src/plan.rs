//! Execution plans — the planner's output and the unit of observable
//! progress (`ExecutionStep`) the client watches through `todo_updated`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Teams
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The named team executors the supervisor can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Search,
    Analysis,
    Document,
}

impl Team {
    /// Dependency rank: search feeds analysis feeds document.
    pub fn rank(self) -> u8 {
        match self {
            Team::Search => 0,
            Team::Analysis => 1,
            Team::Document => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Search => "search",
            Team::Analysis => "analysis",
            Team::Document => "document",
        }
    }

    /// Parse a team name from the configured `suggested_agents` vocabulary.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "search" => Some(Team::Search),
            "analysis" => Some(Team::Analysis),
            "document" => Some(Team::Document),
            _ => None,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Step status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Ordering used to enforce monotone transitions:
    /// pending → in_progress → terminal.
    fn stage(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed | Self::Skipped => 2,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution step
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One observable unit of progress, mapped one-to-one to a team invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_id: String,
    pub team: Team,
    pub task: String,
    pub description: String,
    pub status: StepStatus,
    pub progress_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when the step was satisfied from a prior run's output.
    #[serde(rename = "isReused", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_reused: bool,
}

impl ExecutionStep {
    pub fn new(step_id: impl Into<String>, team: Team, task: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            team,
            task: task.into(),
            description: description.into(),
            status: StepStatus::Pending,
            progress_percentage: 0,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            is_reused: false,
        }
    }

    /// Move the step to a new status. Transitions are monotone
    /// (pending → in_progress → terminal); a backwards move is ignored
    /// and logged, never applied.
    pub fn advance(&mut self, status: StepStatus) {
        if status.stage() < self.status.stage() {
            tracing::warn!(
                step_id = %self.step_id,
                from = ?self.status,
                to = ?status,
                "ignoring backwards step transition"
            );
            return;
        }
        if self.status.is_terminal() && status != self.status {
            tracing::warn!(
                step_id = %self.step_id,
                from = ?self.status,
                to = ?status,
                "ignoring transition out of terminal step status"
            );
            return;
        }

        let now = Utc::now();
        match status {
            StepStatus::InProgress => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            StepStatus::Completed => {
                self.progress_percentage = 100;
                self.completed_at = Some(now);
            }
            StepStatus::Failed | StepStatus::Skipped => {
                self.completed_at = Some(now);
            }
            StepStatus::Pending => {}
        }
        self.status = status;
    }

    /// Raise the progress percentage. Values are clamped to 100 and the
    /// percentage never decreases.
    pub fn set_progress(&mut self, pct: u8) {
        let pct = pct.min(100);
        if pct > self.progress_percentage {
            self.progress_percentage = pct;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Strategy + plan
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    #[default]
    Sequential,
    Parallel,
    Pipeline,
}

/// The planner's output: an ordered set of steps plus a strategy.
///
/// An empty `execution_steps` is a valid plan and means "skip execution,
/// go straight to response".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub intent_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub execution_steps: Vec<ExecutionStep>,
    #[serde(default)]
    pub execution_strategy: ExecutionStrategy,
    /// Partition of team names when strategy is parallel.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallel_groups: Vec<Vec<Team>>,
    pub estimated_total_time_s: u32,
}

impl Plan {
    /// A plan that routes straight to the response node.
    pub fn short_circuit(intent_type: impl Into<String>, confidence: f64, keywords: Vec<String>) -> Self {
        Self {
            intent_type: intent_type.into(),
            confidence,
            keywords,
            execution_steps: Vec::new(),
            execution_strategy: ExecutionStrategy::Sequential,
            parallel_groups: Vec::new(),
            estimated_total_time_s: 0,
        }
    }

    /// The distinct teams referenced by this plan, in step order.
    pub fn teams(&self) -> Vec<Team> {
        let mut teams = Vec::new();
        for step in &self.execution_steps {
            if !teams.contains(&step.team) {
                teams.push(step.team);
            }
        }
        teams
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> ExecutionStep {
        ExecutionStep::new("step_0", Team::Search, "legal search", "search statutes")
    }

    #[test]
    fn advance_sets_timestamps() {
        let mut s = step();
        s.advance(StepStatus::InProgress);
        assert!(s.started_at.is_some());
        assert!(s.completed_at.is_none());

        s.advance(StepStatus::Completed);
        assert_eq!(s.progress_percentage, 100);
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn advance_rejects_backwards_transition() {
        let mut s = step();
        s.advance(StepStatus::InProgress);
        s.advance(StepStatus::Pending);
        assert_eq!(s.status, StepStatus::InProgress);
    }

    #[test]
    fn advance_rejects_leaving_terminal() {
        let mut s = step();
        s.advance(StepStatus::InProgress);
        s.advance(StepStatus::Failed);
        s.advance(StepStatus::Completed);
        assert_eq!(s.status, StepStatus::Failed);
    }

    #[test]
    fn failed_sets_completed_at() {
        let mut s = step();
        s.advance(StepStatus::InProgress);
        s.advance(StepStatus::Failed);
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn progress_is_non_decreasing() {
        let mut s = step();
        s.set_progress(40);
        s.set_progress(20);
        assert_eq!(s.progress_percentage, 40);
        s.set_progress(250);
        assert_eq!(s.progress_percentage, 100);
    }

    #[test]
    fn short_circuit_plan_has_no_steps() {
        let p = Plan::short_circuit("irrelevant", 0.9, vec![]);
        assert!(p.execution_steps.is_empty());
        assert!(p.teams().is_empty());
    }

    #[test]
    fn teams_deduplicates_in_order() {
        let mut p = Plan::short_circuit("comprehensive", 0.8, vec![]);
        p.execution_steps = vec![
            ExecutionStep::new("s0", Team::Search, "a", "b"),
            ExecutionStep::new("s1", Team::Analysis, "c", "d"),
            ExecutionStep::new("s2", Team::Search, "e", "f"),
        ];
        assert_eq!(p.teams(), vec![Team::Search, Team::Analysis]);
    }

    #[test]
    fn team_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Team::Search).unwrap(), "\"search\"");
        assert_eq!(
            serde_json::to_string(&StepStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[test]
    fn team_dependency_rank_orders_search_first() {
        let mut teams = vec![Team::Document, Team::Search, Team::Analysis];
        teams.sort_by_key(|t| t.rank());
        assert_eq!(teams, vec![Team::Search, Team::Analysis, Team::Document]);
    }
}
