//! AppState construction and background-task spawning.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use zipsa_domain::config::{Config, ConfigSeverity};
use zipsa_llm::{LlmGateway, OpenAiCompatClient, PromptStore};
use zipsa_memory::{Cl100kCounter, MemoryService};
use zipsa_store::Store;
use zipsa_tools::builtin::register_builtin_tools;
use zipsa_tools::ToolRegistry;

use crate::runtime::cancel::CancelMap;
use crate::runtime::decision_log::DecisionLog;
use crate::runtime::interrupts::InterruptStore;
use crate::runtime::planner::Planner;
use crate::runtime::progress::ProgressBus;
use crate::runtime::reuse::ReuseCache;
use crate::state::AppState;

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// Validate config, initialize every subsystem, and return a fully
/// wired [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Store ────────────────────────────────────────────────────────
    let store = Arc::new(Store::open(&config.store.db_path).context("opening store")?);

    // ── Prompts ──────────────────────────────────────────────────────
    let prompts = Arc::new(PromptStore::load(&config.prompts).context("loading prompts")?);

    // ── LLM gateway ──────────────────────────────────────────────────
    let client = OpenAiCompatClient::from_config(&config.llm).context("initializing LLM client")?;
    let llm = Arc::new(LlmGateway::new(Arc::new(client), config.llm.clone()));
    tracing::info!(base_url = %config.llm.base_url, "LLM gateway ready");

    // ── Memory service ───────────────────────────────────────────────
    let memory = Arc::new(MemoryService::new(
        store.clone(),
        llm.clone(),
        prompts.clone(),
        config.memory.clone(),
        Arc::new(Cl100kCounter::new()),
    ));

    // ── Tools ────────────────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools, llm.clone(), prompts.clone());
    tracing::info!(tools = tools.len(), "tool registry ready");

    let decisions = Arc::new(
        DecisionLog::new(&config.store.decision_log_dir).context("opening decision log")?,
    );

    // ── Runtime registries ───────────────────────────────────────────
    let planner = Arc::new(Planner::new(llm.clone(), prompts.clone(), config.clone()));
    let state = AppState {
        config: config.clone(),
        store,
        llm,
        prompts,
        memory,
        tools,
        decisions,
        planner,
        progress: Arc::new(ProgressBus::new()),
        interrupts: Arc::new(InterruptStore::new()),
        cancel_map: Arc::new(CancelMap::new()),
        reuse: Arc::new(ReuseCache::new(config.teams.reuse_window)),
    };

    Ok(state)
}

/// Periodically delete expired sessions and their dependent
/// registrations (pending interrupts expire with the session).
pub fn spawn_session_sweeper(state: AppState) {
    let interval = std::time::Duration::from_secs(state.config.server.sweep_interval_s);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match state.store.sweep_expired(chrono::Utc::now()) {
                Ok(swept) => {
                    for session_id in swept {
                        tracing::info!(session_id = %session_id, "session expired");
                        state.cancel_map.cancel(&session_id);
                        state.interrupts.remove(&session_id);
                        state.reuse.remove_session(&session_id);
                        state.progress.unregister(&session_id);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "session sweep failed");
                }
            }
        }
    });
}
