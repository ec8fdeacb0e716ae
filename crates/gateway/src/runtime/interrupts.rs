//! Pending HITL interrupts.
//!
//! A paused run parks a `oneshot` sender here keyed by session id; the
//! transport delivers the human's decision through [`InterruptStore::deliver`].
//! The entry is consumed by the first response — duplicates find nothing
//! and are ignored, which is what makes repeated `interrupt_response`
//! frames harmless.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use zipsa_domain::interrupt::{InterruptRequest, InterruptResponse};

struct PendingInterrupt {
    request: InterruptRequest,
    respond: oneshot::Sender<InterruptResponse>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InterruptStore {
    pending: Mutex<HashMap<String, PendingInterrupt>>,
}

/// How a wait for human input ended.
pub enum InterruptWait {
    Resolved(InterruptResponse),
    /// The interrupt outlived its deadline (session expiry semantics).
    Expired,
}

impl InterruptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an interrupt for a session and get the receiver the paused
    /// run awaits. A previous pending entry for the session is replaced
    /// (its receiver resolves as closed).
    pub fn insert(&self, session_id: &str, request: InterruptRequest) -> oneshot::Receiver<InterruptResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            session_id.to_owned(),
            PendingInterrupt {
                request,
                respond: tx,
                created_at: Utc::now(),
            },
        );
        rx
    }

    /// Deliver a human decision. Returns `false` when no interrupt is
    /// pending (duplicate or stray response — ignored by the caller).
    pub fn deliver(&self, session_id: &str, response: InterruptResponse) -> bool {
        if let Some(pending) = self.pending.lock().remove(session_id) {
            let _ = pending.respond.send(response);
            true
        } else {
            false
        }
    }

    /// The pending request for a session, if any (reconnect re-emission).
    pub fn pending_request(&self, session_id: &str) -> Option<InterruptRequest> {
        self.pending.lock().get(session_id).map(|p| p.request.clone())
    }

    pub fn pending_since(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.pending.lock().get(session_id).map(|p| p.created_at)
    }

    /// Drop a pending interrupt (session expiry). The paused run's
    /// receiver resolves as closed and finalizes the team as failed.
    pub fn remove(&self, session_id: &str) {
        self.pending.lock().remove(session_id);
    }

    /// Await the response with a deadline.
    pub async fn wait(
        &self,
        rx: oneshot::Receiver<InterruptResponse>,
        timeout: Duration,
    ) -> InterruptWait {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => InterruptWait::Resolved(response),
            // Sender dropped (entry replaced or removed) or deadline hit.
            Ok(Err(_)) | Err(_) => InterruptWait::Expired,
        }
    }
}
