//! Tiered conversation memory: short-term transcripts, mid/long-term
//! summaries, a hard token budget, and fire-and-forget background
//! summarization.

pub mod summary;
pub mod tiered;
pub mod tokens;

pub use tiered::{MemoryService, SessionMemory, TieredMemories};
pub use tokens::{Cl100kCounter, FixedCounter, TokenCounter};
