//! Tiered memory load: full transcripts for the short band, summaries
//! for the mid and long bands, bounded by a hard token budget.

use std::sync::Arc;

use serde::Serialize;

use zipsa_domain::config::MemoryConfig;
use zipsa_domain::error::Result;
use zipsa_llm::{LlmGateway, PromptStore};
use zipsa_store::Store;

use crate::tokens::TokenCounter;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One loaded prior session: either a transcript (short band) or a
/// summary (mid/long bands).
#[derive(Debug, Clone, Serialize)]
pub struct SessionMemory {
    pub session_id: String,
    /// Rendered `role: content` lines for transcripts, or the summary text.
    pub content: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TieredMemories {
    pub shortterm: Vec<SessionMemory>,
    pub midterm: Vec<SessionMemory>,
    pub longterm: Vec<SessionMemory>,
    pub total_tokens: usize,
    pub savings_percent: f64,
}

impl TieredMemories {
    /// Render the whole load into one prompt-context block.
    pub fn render_context(&self) -> String {
        let mut out = String::new();
        for (label, band) in [
            ("Recent conversations", &self.shortterm),
            ("Earlier conversations (summaries)", &self.midterm),
            ("Older conversations (summaries)", &self.longterm),
        ] {
            if band.is_empty() {
                continue;
            }
            out.push_str(label);
            out.push('\n');
            for mem in band {
                out.push_str(&mem.content);
                out.push('\n');
            }
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MemoryService {
    pub(crate) store: Arc<Store>,
    pub(crate) llm: Arc<LlmGateway>,
    pub(crate) prompts: Arc<PromptStore>,
    pub(crate) config: MemoryConfig,
    counter: Arc<dyn TokenCounter>,
}

impl MemoryService {
    pub fn new(
        store: Arc<Store>,
        llm: Arc<LlmGateway>,
        prompts: Arc<PromptStore>,
        config: MemoryConfig,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            store,
            llm,
            prompts,
            config,
            counter,
        }
    }

    /// Load tiered memories for a user, excluding the current session.
    ///
    /// The most recent `shortterm_limit` sessions carry full transcripts
    /// (capped at `message_limit` messages each, keeping the tail); the
    /// next `midterm_limit` + `longterm_limit` sessions carry summaries.
    /// While the running token sum exceeds `token_limit`, long-term
    /// entries are dropped first, then mid-term, then short-term tail.
    pub async fn load_tiered(
        &self,
        user_id: &str,
        current_session_id: &str,
    ) -> Result<TieredMemories> {
        let total_limit =
            self.config.shortterm_limit + self.config.midterm_limit + self.config.longterm_limit;
        let sessions =
            self.store
                .recent_sessions_for_user(user_id, current_session_id, total_limit)?;

        let mut memories = TieredMemories::default();

        for (idx, session) in sessions.iter().enumerate() {
            if idx < self.config.shortterm_limit {
                let messages = self
                    .store
                    .recent_messages(&session.session_id, self.config.message_limit)?;
                if messages.is_empty() {
                    continue;
                }
                let content = messages
                    .iter()
                    .map(|m| format!("{}: {}", m.role, m.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                let tokens = self.counter.count(&content);
                memories.shortterm.push(SessionMemory {
                    session_id: session.session_id.clone(),
                    content,
                    tokens,
                });
            } else {
                let summary = self.get_or_create_summary(&session.session_id).await?;
                if summary.is_empty() {
                    continue;
                }
                let tokens = self.counter.count(&summary);
                let mem = SessionMemory {
                    session_id: session.session_id.clone(),
                    content: summary,
                    tokens,
                };
                if idx < self.config.shortterm_limit + self.config.midterm_limit {
                    memories.midterm.push(mem);
                } else {
                    memories.longterm.push(mem);
                }
            }
        }

        let raw_total: usize = band_tokens(&memories);
        self.trim_to_budget(&mut memories);
        memories.total_tokens = band_tokens(&memories);
        memories.savings_percent = if raw_total > 0 {
            (raw_total - memories.total_tokens) as f64 / raw_total as f64 * 100.0
        } else {
            0.0
        };

        tracing::debug!(
            user_id,
            total_tokens = memories.total_tokens,
            savings_percent = memories.savings_percent,
            "tiered memory loaded"
        );
        Ok(memories)
    }

    /// Drop entries until the token budget holds. Bands are loaded
    /// most-recent-first, so the oldest entry of each band is at the end.
    fn trim_to_budget(&self, memories: &mut TieredMemories) {
        let limit = self.config.token_limit;

        while band_tokens(memories) > limit && !memories.longterm.is_empty() {
            memories.longterm.pop();
        }
        while band_tokens(memories) > limit && !memories.midterm.is_empty() {
            memories.midterm.pop();
        }
        // Last resort: trim short-term tail messages line by line.
        while band_tokens(memories) > limit {
            let Some(last) = memories.shortterm.last_mut() else {
                break;
            };
            match last.content.rsplit_once('\n') {
                Some((rest, _dropped)) if !rest.is_empty() => {
                    last.content = rest.to_string();
                    last.tokens = self.counter.count(&last.content);
                }
                _ => {
                    memories.shortterm.pop();
                }
            }
        }
    }
}

fn band_tokens(memories: &TieredMemories) -> usize {
    memories
        .shortterm
        .iter()
        .chain(&memories.midterm)
        .chain(&memories.longterm)
        .map(|m| m.tokens)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::FixedCounter;
    use zipsa_domain::config::{LlmConfig, PromptsConfig};
    use zipsa_llm::MockLlm;

    fn service(config: MemoryConfig, mock: MockLlm) -> MemoryService {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let prompts = Arc::new(
            PromptStore::load(&PromptsConfig {
                path: "/nonexistent".into(),
                hot_reload: false,
            })
            .unwrap(),
        );
        prompts.register("conversation_summary", "Summarize:\n{transcript}");
        MemoryService::new(
            store,
            Arc::new(LlmGateway::new(Arc::new(mock), LlmConfig::default())),
            prompts,
            config,
            Arc::new(FixedCounter { per_word: 1 }),
        )
    }

    fn seed_sessions(svc: &MemoryService, user: &str, n: usize, words_per_msg: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 0..n {
            let s = svc.store.create_session(Some(user), 60).unwrap();
            let msg = vec![format!("w{i}"); words_per_msg].join(" ");
            svc.store.append_message(&s.session_id, "user", &msg, None).unwrap();
            svc.store
                .append_message(&s.session_id, "assistant", &msg, None)
                .unwrap();
            // Touch in order so later sessions are more recent.
            svc.store.touch_session(&s.session_id, 60).unwrap();
            ids.push(s.session_id);
        }
        ids
    }

    #[tokio::test]
    async fn bands_fill_most_recent_first() {
        let config = MemoryConfig {
            shortterm_limit: 1,
            midterm_limit: 1,
            longterm_limit: 1,
            token_limit: 10_000,
            message_limit: 10,
            summary_max_length: 100,
        };
        let mock = MockLlm::new();
        // Two summaries needed (mid + long bands).
        mock.push_text("요약 A");
        mock.push_text("요약 B");
        let svc = service(config, mock);
        let ids = seed_sessions(&svc, "u1", 3, 3);
        let current = svc.store.create_session(Some("u1"), 60).unwrap();

        let mem = svc.load_tiered("u1", &current.session_id).await.unwrap();
        assert_eq!(mem.shortterm.len(), 1);
        assert_eq!(mem.midterm.len(), 1);
        assert_eq!(mem.longterm.len(), 1);
        // Short band holds the most recent prior session.
        assert_eq!(mem.shortterm[0].session_id, ids[2]);
        // The transcript carries both roles.
        assert!(mem.shortterm[0].content.contains("user:"));
        assert!(mem.shortterm[0].content.contains("assistant:"));
    }

    #[tokio::test]
    async fn token_budget_drops_long_before_mid_before_short() {
        let config = MemoryConfig {
            shortterm_limit: 1,
            midterm_limit: 1,
            longterm_limit: 1,
            // Transcript of session C is 2 msgs × 5 words = 10 tokens with
            // per_word = 1 (roles don't count as whitespace-separated words
            // beyond one each → "user: w w w w w" = 6 words). Summaries are
            // 2 words each. Budget of 8 forces dropping long then mid.
            token_limit: 8,
            message_limit: 10,
            summary_max_length: 100,
        };
        let mock = MockLlm::new();
        mock.push_text("긴 요약");
        mock.push_text("긴 요약");
        let svc = service(config, mock);
        seed_sessions(&svc, "u1", 3, 2);
        let current = svc.store.create_session(Some("u1"), 60).unwrap();

        let mem = svc.load_tiered("u1", &current.session_id).await.unwrap();
        assert!(mem.total_tokens <= 8, "budget violated: {}", mem.total_tokens);
        // Long-term went first.
        assert!(mem.longterm.is_empty());
        // Short-term survives ahead of mid/long.
        assert!(!mem.shortterm.is_empty());
        assert!(mem.savings_percent > 0.0);
    }

    #[tokio::test]
    async fn empty_history_yields_empty_memories() {
        let config = MemoryConfig::default();
        let svc = service(config, MockLlm::new());
        let current = svc.store.create_session(Some("u1"), 60).unwrap();
        let mem = svc.load_tiered("u1", &current.session_id).await.unwrap();
        assert!(mem.shortterm.is_empty());
        assert_eq!(mem.total_tokens, 0);
        assert_eq!(mem.savings_percent, 0.0);
    }

    #[tokio::test]
    async fn message_cap_keeps_transcript_tail() {
        let config = MemoryConfig {
            shortterm_limit: 1,
            midterm_limit: 0,
            longterm_limit: 0,
            token_limit: 10_000,
            message_limit: 2,
            summary_max_length: 100,
        };
        let svc = service(config, MockLlm::new());
        let s = svc.store.create_session(Some("u1"), 60).unwrap();
        for i in 0..5 {
            svc.store
                .append_message(&s.session_id, "user", &format!("msg{i}"), None)
                .unwrap();
        }
        let current = svc.store.create_session(Some("u1"), 60).unwrap();

        let mem = svc.load_tiered("u1", &current.session_id).await.unwrap();
        assert_eq!(mem.shortterm.len(), 1);
        assert!(mem.shortterm[0].content.contains("msg4"));
        assert!(!mem.shortterm[0].content.contains("msg0"));
    }
}
