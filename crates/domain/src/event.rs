//! Progress event protocol — the typed outbound frames multiplexed over
//! one streaming channel. Three granularities share the channel: plan
//! steps (`todo_updated`), agent steps (`agent_step_progress`), and
//! stages (`response_generating_*`); ordering is owned by the supervisor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::answer::StructuredAnswer;
use crate::plan::{ExecutionStep, ExecutionStrategy};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One outbound frame. Every event carries an ISO-8601 UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(flatten)]
    pub kind: ProgressEventKind,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(kind: ProgressEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Terminal events end the turn; nothing may follow them until the
    /// run resumes from an interrupt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ProgressEventKind::FinalResponse { .. }
                | ProgressEventKind::Error { .. }
                | ProgressEventKind::WorkflowInterrupted { .. }
        )
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The phase label carried by the respond-stage events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RespondPhase {
    Aggregation,
    ResponseGeneration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// Channel open acknowledgement.
    #[serde(rename = "connected")]
    Connected { session_id: String },

    #[serde(rename = "planning_start")]
    PlanningStart { message: String },

    #[serde(rename = "plan_ready")]
    PlanReady {
        intent: String,
        confidence: f64,
        execution_steps: Vec<ExecutionStep>,
        execution_strategy: ExecutionStrategy,
        estimated_total_time: u32,
        keywords: Vec<String>,
    },

    #[serde(rename = "execution_start")]
    ExecutionStart {
        execution_steps: Vec<ExecutionStep>,
        intent: String,
        confidence: f64,
    },

    /// Full step list with updated fields, sent on every step transition.
    #[serde(rename = "todo_updated")]
    TodoUpdated { execution_steps: Vec<ExecutionStep> },

    /// Intra-team progress.
    #[serde(rename = "agent_step_progress")]
    AgentStepProgress {
        #[serde(rename = "agentName")]
        agent_name: String,
        #[serde(rename = "stepIndex")]
        step_index: usize,
        status: String,
        progress: u8,
    },

    #[serde(rename = "data_reuse_notification")]
    DataReuseNotification { reused_teams: Vec<String> },

    #[serde(rename = "response_generating_start")]
    ResponseGeneratingStart {
        phase: RespondPhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    #[serde(rename = "response_generating_progress")]
    ResponseGeneratingProgress { phase: RespondPhase },

    /// Terminal success frame.
    #[serde(rename = "final_response")]
    FinalResponse { response: FinalResponse },

    /// HITL pause frame.
    #[serde(rename = "workflow_interrupted")]
    WorkflowInterrupted {
        interrupt_data: Value,
        interrupted_by: String,
        interrupt_type: String,
        message: String,
    },

    /// Terminal failure frame.
    #[serde(rename = "error")]
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ProgressEventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::PlanningStart { .. } => "planning_start",
            Self::PlanReady { .. } => "plan_ready",
            Self::ExecutionStart { .. } => "execution_start",
            Self::TodoUpdated { .. } => "todo_updated",
            Self::AgentStepProgress { .. } => "agent_step_progress",
            Self::DataReuseNotification { .. } => "data_reuse_notification",
            Self::ResponseGeneratingStart { .. } => "response_generating_start",
            Self::ResponseGeneratingProgress { .. } => "response_generating_progress",
            Self::FinalResponse { .. } => "final_response",
            Self::WorkflowInterrupted { .. } => "workflow_interrupted",
            Self::Error { .. } => "error",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Final response payload
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The payload of the terminal `final_response` frame. `answer` carries
/// a synthesized answer; `message` carries guidance text for trivial or
/// off-topic queries — the client treats both as peer success outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<StructuredAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Answer,
    Guidance,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound frames (client → core)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "query")]
    Query {
        query: String,
        #[serde(default)]
        enable_checkpointing: Option<bool>,
    },
    #[serde(rename = "interrupt_response")]
    InterruptResponse {
        action: crate::interrupt::InterruptAction,
        #[serde(default)]
        feedback: Option<String>,
        #[serde(default)]
        modifications: Option<String>,
    },
}
