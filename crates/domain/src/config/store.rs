use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Relational store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. The schema is created on first open.
    #[serde(default = "d_db_path")]
    pub db_path: PathBuf,
    /// Directory for the per-team decision log (JSONL).
    #[serde(default = "d_decision_log_dir")]
    pub decision_log_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: d_db_path(),
            decision_log_dir: d_decision_log_dir(),
        }
    }
}

fn d_db_path() -> PathBuf {
    PathBuf::from("./data/zipsa.db")
}

fn d_decision_log_dir() -> PathBuf {
    PathBuf::from("./data/decisions")
}
