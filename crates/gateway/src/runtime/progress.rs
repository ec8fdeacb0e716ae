//! Per-session progress event bus.
//!
//! The registry maps session ids to the outbound channel of the connected
//! transport. Emission is non-blocking past the channel handoff: a full
//! or closed channel drops the event with a warning — the transport is
//! expected to buffer on its own channel, and a disconnected client's
//! run learns about the close through cancellation, not through emit
//! failures.
//!
//! The registry is process-local and never enters run state, so
//! checkpoint serialization has nothing to strip.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use zipsa_domain::event::{ProgressEvent, ProgressEventKind};

#[derive(Default)]
pub struct ProgressBus {
    channels: RwLock<HashMap<String, mpsc::Sender<ProgressEvent>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the outbound channel for a session (transport side).
    pub fn register(&self, session_id: &str, sender: mpsc::Sender<ProgressEvent>) {
        self.channels
            .write()
            .insert(session_id.to_owned(), sender);
    }

    /// Drop the channel registration (on disconnect).
    pub fn unregister(&self, session_id: &str) {
        self.channels.write().remove(session_id);
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        self.channels.read().contains_key(session_id)
    }

    /// Emit an event to the session's channel. Cheap and non-blocking;
    /// events to unregistered or saturated channels are dropped.
    pub fn emit(&self, session_id: &str, kind: ProgressEventKind) {
        let event = ProgressEvent::new(kind);
        let sender = self.channels.read().get(session_id).cloned();
        match sender {
            Some(sender) => {
                if let Err(e) = sender.try_send(event) {
                    tracing::warn!(
                        session_id,
                        error = %e,
                        "progress channel full or closed; dropping event"
                    );
                }
            }
            None => {
                tracing::debug!(session_id, "no progress channel registered; dropping event");
            }
        }
    }
}
