use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server / transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_bind")]
    pub bind: String,
    /// Session idle lifetime in minutes; expired sessions are swept.
    #[serde(default = "d_session_ttl_minutes")]
    pub session_ttl_minutes: u64,
    /// Sweep interval for the expiry task.
    #[serde(default = "d_sweep_interval_s")]
    pub sweep_interval_s: u64,
    /// Outbound channel depth per WebSocket connection.
    #[serde(default = "d_channel_depth")]
    pub channel_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: d_bind(),
            session_ttl_minutes: d_session_ttl_minutes(),
            sweep_interval_s: d_sweep_interval_s(),
            channel_depth: d_channel_depth(),
        }
    }
}

fn d_bind() -> String {
    "127.0.0.1:8710".into()
}

fn d_session_ttl_minutes() -> u64 {
    120
}

fn d_sweep_interval_s() -> u64 {
    300
}

fn d_channel_depth() -> usize {
    64
}
