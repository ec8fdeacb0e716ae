//! Team executors.
//!
//! Every team runs the same skeleton — prepare → route → execute →
//! aggregate → finalize — provided by [`run_team`]; the per-team hooks
//! live behind [`TeamExecutor`]. Tool failures never cross the team
//! boundary, and a team failure never aborts the run.

pub mod analysis;
pub mod document;
pub mod search;

use serde_json::Value;

use zipsa_domain::error::Result;
use zipsa_domain::interrupt::InterruptRequest;
use zipsa_domain::plan::Team;
use zipsa_domain::team::{SharedContext, TeamState, TeamStatus};
use zipsa_llm::prompts::vars;
use zipsa_llm::ChatMessage;
use zipsa_tools::{InvokeRecord, ToolMetadata};

use crate::runtime::cancel::CancelToken;
use crate::runtime::decision_log::{DecisionRecord, ToolExecutionRecord};
use crate::state::AppState;

pub use analysis::AnalysisTeam;
pub use document::DocumentTeam;
pub use search::SearchTeam;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context + outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything one team execution is handed by the supervisor.
pub struct TeamContext {
    pub app: AppState,
    pub run_id: uuid::Uuid,
    pub step_index: usize,
    pub shared: SharedContext,
    /// Output of upstream teams, projected per the hand-off rules.
    pub input_data: Value,
    pub cancel: CancelToken,
}

/// How a team run ended from the supervisor's point of view.
pub enum TeamRunOutcome {
    Done(TeamState),
    /// The team paused for human review (document generation).
    NeedsReview {
        state: TeamState,
        request: InterruptRequest,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-team hooks plugged into the shared skeleton.
#[async_trait::async_trait]
pub trait TeamExecutor: Send + Sync {
    fn team(&self) -> Team;

    /// The prompt-store/model task name for this team's tool selection.
    fn selection_task(&self) -> &'static str;

    /// Derive team-specific inputs from the shared context into
    /// `state.inputs`.
    async fn prepare(&self, ctx: &TeamContext, state: &mut TeamState) -> Result<()>;

    /// Build the invocation inputs for one selected tool.
    fn tool_inputs(&self, state: &TeamState, tool: &ToolMetadata) -> Value;

    /// Merge tool outcomes into `state.outputs`. Tool completion order is
    /// nondeterministic, so the merge must be commutative over records.
    fn merge_outcomes(&self, state: &mut TeamState, records: &[InvokeRecord]);

    /// Post-aggregation enrichment (insight generation, report building).
    async fn post_aggregate(&self, _ctx: &TeamContext, _state: &mut TeamState) -> Result<()> {
        Ok(())
    }

    /// Whether the finished state needs human review before finalizing.
    fn review_request(&self, _ctx: &TeamContext, _state: &TeamState) -> Option<InterruptRequest> {
        None
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed reasoning recorded when the selector falls back.
const FALLBACK_REASONING: &str = "tool selection unavailable; invoking all applicable tools";
const FALLBACK_CONFIDENCE: f64 = 0.3;

struct Selection {
    tools: Vec<String>,
    reasoning: String,
    confidence: f64,
    fallback: bool,
}

/// Ask the LLM which of the team's tools apply. A failed call — or a
/// response naming no known tool — falls back to the full tool set.
/// The fallback is a deliberate safety net, never a silent skip.
async fn select_tools(
    ctx: &TeamContext,
    executor: &dyn TeamExecutor,
    available: &[ToolMetadata],
) -> Selection {
    let all_names: Vec<String> = available.iter().map(|m| m.name.clone()).collect();

    let metadata_json = match serde_json::to_string(available) {
        Ok(j) => j,
        Err(e) => {
            tracing::warn!(error = %e, "tool metadata serialization failed; using full set");
            return Selection {
                tools: all_names,
                reasoning: FALLBACK_REASONING.into(),
                confidence: FALLBACK_CONFIDENCE,
                fallback: true,
            };
        }
    };

    let prompt = match ctx.app.prompts.render(
        executor.selection_task(),
        &vars([
            ("query", ctx.shared.query.clone()),
            ("tools", metadata_json),
        ]),
    ) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "tool selection prompt unavailable; using full set");
            return Selection {
                tools: all_names,
                reasoning: FALLBACK_REASONING.into(),
                confidence: FALLBACK_CONFIDENCE,
                fallback: true,
            };
        }
    };

    match ctx
        .app
        .llm
        .chat_json(executor.selection_task(), vec![ChatMessage::user(prompt)])
        .await
    {
        Ok(raw) => {
            let selected: Vec<String> = raw
                .get("selected_tools")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .filter(|name| all_names.iter().any(|n| n == name))
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default();

            if selected.is_empty() {
                tracing::warn!(
                    team = %executor.team(),
                    "selector named no known tool; using full set"
                );
                return Selection {
                    tools: all_names,
                    reasoning: FALLBACK_REASONING.into(),
                    confidence: FALLBACK_CONFIDENCE,
                    fallback: true,
                };
            }

            Selection {
                tools: selected,
                reasoning: raw
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                confidence: raw
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.5),
                fallback: false,
            }
        }
        Err(e) => {
            tracing::warn!(team = %executor.team(), error = %e, "tool selection failed; using full set");
            Selection {
                tools: all_names,
                reasoning: FALLBACK_REASONING.into(),
                confidence: FALLBACK_CONFIDENCE,
                fallback: true,
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The shared skeleton
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one team through the shared skeleton. Never returns `Err`: every
/// failure mode lands in the team state.
pub async fn run_team(executor: &dyn TeamExecutor, ctx: &TeamContext) -> TeamRunOutcome {
    let team = executor.team();
    let mut state = TeamState::new(team, ctx.shared.clone(), ctx.input_data.clone());
    let emit_stage = |stage: &str, progress: u8| {
        ctx.app.progress.emit(
            &ctx.shared.session_id,
            zipsa_domain::event::ProgressEventKind::AgentStepProgress {
                agent_name: team.as_str().to_string(),
                step_index: ctx.step_index,
                status: stage.to_string(),
                progress,
            },
        );
    };

    // ── prepare ───────────────────────────────────────────────────
    emit_stage("prepare", 10);
    if let Err(e) = executor.prepare(ctx, &mut state).await {
        tracing::warn!(team = %team, error = %e, "team prepare failed");
        state.error = Some(e.to_string());
        state.finalize(TeamStatus::Failed);
        return TeamRunOutcome::Done(state);
    }

    // ── route ─────────────────────────────────────────────────────
    let available = ctx.app.tools.tools_for_tag(team.as_str());
    if available.is_empty() {
        tracing::debug!(team = %team, "no tools apply; skipping team");
        state.finalize(TeamStatus::Skipped);
        return TeamRunOutcome::Done(state);
    }
    let metadata: Vec<ToolMetadata> = available.iter().map(|t| t.metadata().clone()).collect();

    // ── select ────────────────────────────────────────────────────
    emit_stage("select_tools", 30);
    let selection = select_tools(ctx, executor, &metadata).await;

    if ctx.cancel.is_cancelled() {
        state.error = Some("cancelled".into());
        state.finalize(TeamStatus::Failed);
        return TeamRunOutcome::Done(state);
    }

    // ── execute: concurrent fan-out under the team deadline ───────
    emit_stage("execute", 50);
    let deadline = std::time::Duration::from_secs(ctx.app.config.teams.deadline_s);
    let invocations = selection.tools.iter().map(|name| {
        let inputs = metadata
            .iter()
            .find(|m| &m.name == name)
            .map(|m| executor.tool_inputs(&state, m))
            .unwrap_or(Value::Null);
        let registry = ctx.app.tools.clone();
        let name = name.clone();
        async move { registry.invoke(&name, &inputs).await }
    });
    let fanout = futures_util::future::join_all(invocations);

    let records: Vec<InvokeRecord> = match tokio::time::timeout(deadline, fanout).await {
        Ok(records) => records,
        Err(_) => {
            tracing::warn!(team = %team, deadline_s = ctx.app.config.teams.deadline_s, "team deadline exceeded");
            record_decision(ctx, &state, &selection, &[]);
            state.error = Some("timeout".into());
            state.finalize(TeamStatus::Failed);
            return TeamRunOutcome::Done(state);
        }
    };

    record_decision(ctx, &state, &selection, &records);

    // ── aggregate ─────────────────────────────────────────────────
    emit_stage("aggregate", 80);
    executor.merge_outcomes(&mut state, &records);
    if let Err(e) = executor.post_aggregate(ctx, &mut state).await {
        // Enrichment failures degrade the output, they do not fail the
        // team when raw tool results exist.
        tracing::warn!(team = %team, error = %e, "post-aggregation step failed");
        if let Some(outputs) = state.outputs.as_object_mut() {
            outputs.insert("aggregation_error".into(), Value::String(e.to_string()));
        }
    }

    // ── finalize ──────────────────────────────────────────────────
    let any_success = records.iter().any(|r| r.outcome.is_success());
    let status = if records.is_empty() {
        TeamStatus::Skipped
    } else if any_success {
        TeamStatus::Completed
    } else {
        TeamStatus::Failed
    };

    if status == TeamStatus::Completed {
        if let Some(request) = executor.review_request(ctx, &state) {
            emit_stage("awaiting_review", 90);
            // The state stays open; the supervisor decides how it ends.
            return TeamRunOutcome::NeedsReview { state, request };
        }
    }

    if status == TeamStatus::Failed {
        state.error = Some(
            records
                .iter()
                .filter_map(|r| r.outcome.error.clone())
                .collect::<Vec<_>>()
                .join("; "),
        );
    }
    emit_stage("finalize", 100);
    state.finalize(status);
    TeamRunOutcome::Done(state)
}

fn record_decision(
    ctx: &TeamContext,
    state: &TeamState,
    selection: &Selection,
    records: &[InvokeRecord],
) {
    ctx.app.decisions.append(DecisionRecord {
        run_id: ctx.run_id,
        session_id: state.shared_context.session_id.clone(),
        team: state.team,
        selected_tools: selection.tools.clone(),
        reasoning: selection.reasoning.clone(),
        confidence: selection.confidence,
        fallback: selection.fallback,
        executions: records
            .iter()
            .map(|r| ToolExecutionRecord {
                tool: r.tool.clone(),
                success: r.outcome.is_success(),
                latency_ms: r.latency_ms,
                error: r.outcome.error.clone(),
            })
            .collect(),
        total_latency_ms: records.iter().map(|r| r.latency_ms).sum(),
        timestamp: chrono::Utc::now(),
    });
}
