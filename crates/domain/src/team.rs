//! Team-facing contracts: the shared context a team receives from the
//! supervisor, the team's private working state, and the outcome shape
//! every tool must return.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::Team;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The projection of the run a team is allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedContext {
    pub query: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub language: String,
    pub timestamp: DateTime<Utc>,
}

impl SharedContext {
    pub fn new(
        query: impl Into<String>,
        session_id: impl Into<String>,
        user_id: Option<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            user_id,
            language: language.into(),
            timestamp: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Team status + state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Private working state of one team execution.
///
/// A team that raises recovers to `Failed` without aborting the run; the
/// supervisor only reads the conventional status/output fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamState {
    pub team: Team,
    pub shared_context: SharedContext,
    /// Team-specific inputs (keywords, filters, analysis_type,
    /// document_type, template parameters, upstream hand-off).
    #[serde(default)]
    pub inputs: Value,
    /// Team-specific outputs (raw_results, insights, report,
    /// generated_document, review_result).
    #[serde(default)]
    pub outputs: Value,
    pub status: TeamStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl TeamState {
    pub fn new(team: Team, shared_context: SharedContext, inputs: Value) -> Self {
        Self {
            team,
            shared_context,
            inputs,
            outputs: Value::Null,
            status: TeamStatus::Running,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn finalize(&mut self, status: TeamStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// The contract every tool invocation resolves to. Raised errors are
/// converted to `status = error` at the team boundary; they never cross it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            status: OutcomeStatus::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
