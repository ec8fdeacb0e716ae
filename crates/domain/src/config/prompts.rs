use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt templates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory of `<name>.txt` templates.
    #[serde(default = "d_path")]
    pub path: PathBuf,
    /// Re-read templates whose file changed on disk (dev convenience).
    #[serde(default)]
    pub hot_reload: bool,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            path: d_path(),
            hot_reload: false,
        }
    }
}

fn d_path() -> PathBuf {
    PathBuf::from("./prompts")
}
