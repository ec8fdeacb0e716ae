//! Shared application state passed to all API handlers and the runtime.

use std::sync::Arc;

use zipsa_domain::config::Config;
use zipsa_llm::{LlmGateway, PromptStore};
use zipsa_memory::MemoryService;
use zipsa_store::Store;
use zipsa_tools::ToolRegistry;

use crate::runtime::cancel::CancelMap;
use crate::runtime::decision_log::DecisionLog;
use crate::runtime::interrupts::InterruptStore;
use crate::runtime::planner::Planner;
use crate::runtime::progress::ProgressBus;
use crate::runtime::reuse::ReuseCache;

/// Shared application state.
///
/// Fields are grouped by concern:
/// - **Core services** — config, store, LLM gateway, prompts, memory
/// - **Tools** — registry + decision audit log
/// - **Runtime** — planner, progress bus, interrupts, cancellation, reuse
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub llm: Arc<LlmGateway>,
    pub prompts: Arc<PromptStore>,
    pub memory: Arc<MemoryService>,

    // ── Tools ─────────────────────────────────────────────────────────
    pub tools: Arc<ToolRegistry>,
    pub decisions: Arc<DecisionLog>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub planner: Arc<Planner>,
    pub progress: Arc<ProgressBus>,
    pub interrupts: Arc<InterruptStore>,
    pub cancel_map: Arc<CancelMap>,
    pub reuse: Arc<ReuseCache>,
}
