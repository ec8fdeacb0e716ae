//! Per-team decision audit log.
//!
//! Every team execution appends one record: which tools the selector
//! picked, why, whether the safety-net fallback fired, and how each
//! invocation went. Records land in a JSONL file for offline audit and
//! a bounded in-memory ring for introspection.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use zipsa_domain::plan::Team;

const MAX_DECISIONS_IN_MEMORY: usize = 500;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct ToolExecutionRecord {
    pub tool: String,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub run_id: Uuid,
    pub session_id: String,
    pub team: Team,
    pub selected_tools: Vec<String>,
    pub reasoning: String,
    pub confidence: f64,
    /// True when the selector failed and the full tool set was used.
    pub fallback: bool,
    pub executions: Vec<ToolExecutionRecord>,
    pub total_latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DecisionLog {
    path: PathBuf,
    ring: Mutex<VecDeque<DecisionRecord>>,
}

impl DecisionLog {
    /// Create the log under `dir/decisions.jsonl`.
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join("decisions.jsonl"),
            ring: Mutex::new(VecDeque::new()),
        })
    }

    /// Append a record. The file write is best-effort: audit loss is
    /// logged, never propagated into the run.
    pub fn append(&self, record: DecisionRecord) {
        match serde_json::to_string(&record) {
            Ok(line) => {
                let result = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .and_then(|mut f| writeln!(f, "{line}"));
                if let Err(e) = result {
                    tracing::warn!(error = %e, "decision log write failed");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "decision record serialization failed");
            }
        }

        let mut ring = self.ring.lock();
        ring.push_back(record);
        while ring.len() > MAX_DECISIONS_IN_MEMORY {
            ring.pop_front();
        }
    }

    /// The most recent `n` records, newest last.
    pub fn recent(&self, n: usize) -> Vec<DecisionRecord> {
        let ring = self.ring.lock();
        ring.iter().rev().take(n).rev().cloned().collect()
    }
}
