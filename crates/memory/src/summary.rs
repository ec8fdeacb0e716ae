//! Summary resolution and background summarization.
//!
//! A session's summary lives in the `chat_sessions.metadata.summary`
//! cache. Resolution is idempotent: a cached summary is returned without
//! an LLM call; a generated one is written back best-effort.

use std::sync::Arc;

use zipsa_domain::error::Result;
use zipsa_llm::prompts::vars;
use zipsa_llm::ChatMessage;

use crate::tiered::MemoryService;

impl MemoryService {
    /// Resolve the summary for a session: cached if present, otherwise
    /// generated with the `conversation_summary` prompt, capped at
    /// `summary_max_length` characters, and cached best-effort.
    pub async fn get_or_create_summary(&self, session_id: &str) -> Result<String> {
        if let Some(cached) = self.store.get_cached_summary(session_id)? {
            return Ok(cached);
        }

        let messages = self
            .store
            .recent_messages(session_id, self.config.message_limit)?;
        if messages.is_empty() {
            return Ok(String::new());
        }

        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = self
            .prompts
            .render("conversation_summary", &vars([("transcript", transcript)]))?;

        let raw = self
            .llm
            .chat_text("conversation_summary", vec![ChatMessage::user(prompt)])
            .await?;
        let summary = cap_chars(&raw, self.config.summary_max_length);

        // Best-effort cache write; on failure return the text uncached.
        let user_id = self
            .store
            .get_session(session_id)?
            .and_then(|s| s.user_id)
            .unwrap_or_default();
        if let Err(e) = self.store.set_cached_summary(session_id, &user_id, &summary) {
            tracing::warn!(session_id, error = %e, "summary cache write failed");
        }

        Ok(summary)
    }

    /// Fire-and-forget summarization after a turn completes. The task
    /// holds its own handles and never shares the response path's
    /// lifecycle; failures are logged and dropped.
    pub fn spawn_background_summarize(self: &Arc<Self>, session_id: String, user_id: String) {
        let svc = Arc::clone(self);
        tokio::spawn(async move {
            // Invalidate so the fresh turn is included in the new summary.
            if let Err(e) = svc.refresh_summary(&session_id, &user_id).await {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "background summarization failed"
                );
            }
        });
    }

    /// Regenerate and cache the summary regardless of the cached value.
    /// Summaries are immutable to readers; this is the one explicit
    /// invalidation path.
    pub async fn refresh_summary(&self, session_id: &str, user_id: &str) -> Result<()> {
        let messages = self
            .store
            .recent_messages(session_id, self.config.message_limit)?;
        if messages.is_empty() {
            return Ok(());
        }
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = self
            .prompts
            .render("conversation_summary", &vars([("transcript", transcript)]))?;
        let raw = self
            .llm
            .chat_text("conversation_summary", vec![ChatMessage::user(prompt)])
            .await?;
        let summary = cap_chars(&raw, self.config.summary_max_length);
        self.store.set_cached_summary(session_id, user_id, &summary)?;
        Ok(())
    }
}

/// Cap a string at `max` characters on a char boundary.
fn cap_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
