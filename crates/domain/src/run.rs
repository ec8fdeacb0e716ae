//! Run state — everything one end-to-end query processing carries.
//!
//! A `RunState` is plain serializable data: it is what the checkpointer
//! writes and what a resumed run is rebuilt from. It never holds
//! callbacks, sockets, or tool handles.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::answer::StructuredAnswer;
use crate::plan::{Plan, Team};
use crate::team::TeamStatus;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phase
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    Planning,
    Executing,
    Aggregation,
    ResponseGeneration,
    Interrupted,
    Completed,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Team result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The supervisor-facing summary of one team execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamResult {
    pub team: Team,
    pub status: TeamStatus,
    pub output: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// True when the output was copied from a prior run (data reuse).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reused: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The serializable state tree of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Monotone per-session counter.
    pub request_id: u64,
    pub query: String,
    pub language: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// Teams currently executing / done / failed. Together these always
    /// partition the plan's team set during the executing phase.
    #[serde(default)]
    pub active_teams: BTreeSet<Team>,
    #[serde(default)]
    pub completed_teams: BTreeSet<Team>,
    #[serde(default)]
    pub failed_teams: BTreeSet<Team>,
    #[serde(default)]
    pub team_results: BTreeMap<Team, TeamResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<StructuredAnswer>,
    /// Index into `plan.execution_steps` of the team paused on HITL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted_step: Option<usize>,
    /// Document revision counter for the HITL modify loop.
    #[serde(default)]
    pub revision_count: u32,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_log: Vec<String>,
}

impl RunState {
    pub fn new(
        session_id: impl Into<String>,
        user_id: Option<String>,
        request_id: u64,
        query: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            session_id: session_id.into(),
            user_id,
            request_id,
            query: query.into(),
            language: language.into(),
            phase: Phase::Initialization,
            plan: None,
            active_teams: BTreeSet::new(),
            completed_teams: BTreeSet::new(),
            failed_teams: BTreeSet::new(),
            team_results: BTreeMap::new(),
            aggregated: None,
            answer: None,
            interrupted_step: None,
            revision_count: 0,
            started_at: Utc::now(),
            ended_at: None,
            error_log: Vec::new(),
        }
    }

    /// Mark a team as started executing.
    pub fn team_started(&mut self, team: Team) {
        self.completed_teams.remove(&team);
        self.failed_teams.remove(&team);
        self.active_teams.insert(team);
    }

    /// Record a finished team and file its result.
    pub fn team_finished(&mut self, result: TeamResult) {
        let team = result.team;
        self.active_teams.remove(&team);
        match result.status {
            TeamStatus::Failed => {
                self.failed_teams.insert(team);
            }
            _ => {
                self.completed_teams.insert(team);
            }
        }
        self.team_results.insert(team, result);
    }

    /// Verify the partition invariant over the plan's team set.
    ///
    /// `active ∪ completed ∪ failed` must equal the set of planned teams
    /// that have been started, and the three sets must be pairwise
    /// disjoint (guaranteed structurally by `team_started`/`team_finished`,
    /// checked here for tests and checkpoint validation).
    pub fn partition_holds(&self) -> bool {
        self.active_teams.is_disjoint(&self.completed_teams)
            && self.active_teams.is_disjoint(&self.failed_teams)
            && self.completed_teams.is_disjoint(&self.failed_teams)
    }

    pub fn finish(&mut self, phase: Phase) {
        debug_assert!(phase.is_terminal() || phase == Phase::Interrupted);
        self.phase = phase;
        self.ended_at = Some(Utc::now());
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_log.push(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> RunState {
        RunState::new("sess-1", Some("user-1".into()), 1, "전세금 인상 한도는?", "ko")
    }

    fn result(team: Team, status: TeamStatus) -> TeamResult {
        TeamResult {
            team,
            status,
            output: serde_json::json!({}),
            error: None,
            duration_ms: 10,
            reused: false,
        }
    }

    #[test]
    fn partition_after_start_and_finish() {
        let mut r = run();
        r.team_started(Team::Search);
        r.team_started(Team::Analysis);
        assert!(r.partition_holds());

        r.team_finished(result(Team::Search, TeamStatus::Completed));
        assert!(r.partition_holds());
        assert!(r.completed_teams.contains(&Team::Search));
        assert!(r.active_teams.contains(&Team::Analysis));

        r.team_finished(result(Team::Analysis, TeamStatus::Failed));
        assert!(r.partition_holds());
        assert!(r.failed_teams.contains(&Team::Analysis));
        assert!(r.active_teams.is_empty());
    }

    #[test]
    fn skipped_team_counts_as_completed_partition() {
        let mut r = run();
        r.team_started(Team::Document);
        r.team_finished(result(Team::Document, TeamStatus::Skipped));
        assert!(r.completed_teams.contains(&Team::Document));
        assert!(r.partition_holds());
    }

    #[test]
    fn restart_after_failure_moves_team_back_to_active() {
        // HITL resume re-enters execute at the paused team.
        let mut r = run();
        r.team_started(Team::Document);
        r.team_finished(result(Team::Document, TeamStatus::Failed));
        r.team_started(Team::Document);
        assert!(r.active_teams.contains(&Team::Document));
        assert!(!r.failed_teams.contains(&Team::Document));
        assert!(r.partition_holds());
    }

    #[test]
    fn checkpoint_round_trip_preserves_state() {
        let mut r = run();
        r.phase = Phase::Executing;
        r.team_started(Team::Search);
        r.team_finished(result(Team::Search, TeamStatus::Completed));
        r.record_error("transient tool error");

        let json = serde_json::to_string(&r).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, r.run_id);
        assert_eq!(back.phase, Phase::Executing);
        assert_eq!(back.completed_teams, r.completed_teams);
        assert_eq!(back.error_log, r.error_log);
        assert!(back.partition_holds());
    }

    #[test]
    fn finish_stamps_end_time() {
        let mut r = run();
        r.finish(Phase::Completed);
        assert!(r.ended_at.is_some());
        assert!(r.phase.is_terminal());
    }
}
