//! zipsa gateway — the streaming multi-agent orchestration runtime for
//! the real-estate consultation assistant.
//!
//! A WebSocket client submits a query; the supervisor plans a
//! team-of-agents execution, streams progress events back, optionally
//! pauses for document review, and emits a structured answer. Every
//! phase is checkpointed so a disconnected client can rejoin.

pub mod api;
pub mod bootstrap;
pub mod runtime;
pub mod state;
