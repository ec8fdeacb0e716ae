//! Cross-run data reuse.
//!
//! A team whose tools are reuse-eligible records its output under an
//! input fingerprint; a later run in the same session with a matching
//! fingerprint copies the output byte-identical instead of re-invoking
//! tools. The fingerprint is the SHA-256 of the canonical JSON (object
//! keys sorted recursively, no insignificant whitespace) of
//! `{team, inputs}`.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use zipsa_domain::plan::Team;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fingerprint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Serialize a value with object keys sorted recursively.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        other => other.to_string(),
    }
}

/// The input fingerprint for a team invocation.
pub fn fingerprint(team: Team, inputs: &Value) -> String {
    let canonical = canonical_json(&serde_json::json!({
        "team": team.as_str(),
        "inputs": inputs,
    }));
    let digest = Sha256::digest(canonical.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
struct ReuseEntry {
    fingerprint: String,
    team: Team,
    output: Value,
}

/// Per-session ring of recent team outputs, bounded by the configured
/// run window.
pub struct ReuseCache {
    window: usize,
    entries: Mutex<HashMap<String, VecDeque<ReuseEntry>>>,
}

impl ReuseCache {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a team output for later reuse.
    pub fn record(&self, session_id: &str, team: Team, fingerprint: String, output: Value) {
        let mut entries = self.entries.lock();
        let ring = entries.entry(session_id.to_owned()).or_default();
        ring.push_front(ReuseEntry {
            fingerprint,
            team,
            output,
        });
        while ring.len() > self.window {
            ring.pop_back();
        }
    }

    /// Look up a prior output with the same fingerprint.
    pub fn lookup(&self, session_id: &str, team: Team, fingerprint: &str) -> Option<Value> {
        self.entries.lock().get(session_id).and_then(|ring| {
            ring.iter()
                .find(|e| e.team == team && e.fingerprint == fingerprint)
                .map(|e| e.output.clone())
        })
    }

    /// Drop a session's entries (expiry / close).
    pub fn remove_session(&self, session_id: &str) {
        self.entries.lock().remove(session_id);
    }
}
