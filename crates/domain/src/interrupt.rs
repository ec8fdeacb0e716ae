//! Human-in-the-loop types. A team that needs approval serializes an
//! `InterruptRequest`; the run stays paused until the matching
//! `InterruptResponse` arrives or the session expires.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptAction {
    Approve,
    Modify,
    Reject,
}

/// Written by an HITL-capable team when it needs human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptRequest {
    /// The content under review (e.g. a document draft).
    pub content: Value,
    pub message: String,
    pub allowed_actions: Vec<InterruptAction>,
    /// Discriminator surfaced to the client (e.g. "document_review").
    pub interrupt_type: String,
    /// The team that raised the interrupt.
    pub interrupted_by: String,
}

impl InterruptRequest {
    pub fn document_review(draft: Value, message: impl Into<String>) -> Self {
        Self {
            content: draft,
            message: message.into(),
            allowed_actions: vec![
                InterruptAction::Approve,
                InterruptAction::Modify,
                InterruptAction::Reject,
            ],
            interrupt_type: "document_review".into(),
            interrupted_by: "document".into(),
        }
    }
}

/// The human's decision, delivered over the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptResponse {
    pub action: InterruptAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifications: Option<String>,
}
