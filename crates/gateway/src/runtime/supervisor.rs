//! The supervisor state machine.
//!
//! Owns the top-level graph — initialize → plan → route → execute teams
//! → aggregate → respond — and every side effect that bridges the inside
//! and outside of a run: memory load, checkpoint writes, progress
//! emission, and final answer formatting. Teams cannot abort a run and
//! tools cannot raise across the team boundary; only this layer may
//! declare a run fatal.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::Instrument;

use zipsa_domain::error::{Error, Result};
use zipsa_domain::event::{ProgressEventKind, RespondPhase};
use zipsa_domain::interrupt::{InterruptAction, InterruptResponse};
use zipsa_domain::plan::{ExecutionStrategy, StepStatus, Team};
use zipsa_domain::run::{Phase, RunState, TeamResult};
use zipsa_domain::team::{SharedContext, TeamState, TeamStatus};

use crate::runtime::cancel::CancelToken;
use crate::runtime::formatter;
use crate::runtime::interrupts::InterruptWait;
use crate::runtime::reuse;
use crate::runtime::teams::{
    self, AnalysisTeam, DocumentTeam, SearchTeam, TeamContext, TeamExecutor, TeamRunOutcome,
};
use crate::state::AppState;

/// Failure reason recorded when a review pause outlives its deadline.
const HITL_EXPIRED: &str = "hitl_expired";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct QueryInput {
    pub session_id: String,
    pub user_id: Option<String>,
    pub query: String,
    /// Per-query override of `supervisor.enable_checkpointing`.
    pub enable_checkpointing: Option<bool>,
}

enum ExecFlow {
    Finished,
    Cancelled,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry points
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one query end to end. Spawned per inbound `query` frame; all
/// outcomes (success, guidance, fatal error, cancellation) are handled
/// here — the caller only needs to make sure the session isn't busy.
pub async fn run_query(state: AppState, input: QueryInput) {
    let session_id = input.session_id.clone();
    let cancel = state.cancel_map.register(&session_id);
    let checkpointing = input
        .enable_checkpointing
        .unwrap_or(state.config.supervisor.enable_checkpointing);

    // ── initialize ────────────────────────────────────────────────
    let request_id = match state.store.next_request_id(&session_id) {
        Ok(id) => id,
        Err(e) => {
            fail_run_early(&state, &session_id, &e);
            state.cancel_map.remove(&session_id);
            return;
        }
    };
    let mut run = RunState::new(
        &session_id,
        input.user_id.clone(),
        request_id,
        &input.query,
        "ko",
    );
    write_checkpoint(&state, &run, checkpointing);

    let span = tracing::info_span!("run", run_id = %run.run_id, session_id = %session_id);
    tracing::debug!(parent: &span, request_id, "run started");

    if let Err(e) = run_query_inner(&state, &mut run, &cancel, checkpointing)
        .instrument(span)
        .await
    {
        run.record_error(e.to_string());
        run.finish(Phase::Error);
        write_checkpoint(&state, &run, checkpointing);
        state.progress.emit(
            &session_id,
            ProgressEventKind::Error {
                error: "run failed".into(),
                details: Some(e.to_string()),
            },
        );
        tracing::warn!(error = %e, "run failed");
    }

    state.cancel_map.remove(&session_id);
}

/// Resume a run rehydrated from its latest `interrupted` checkpoint,
/// applying a freshly delivered review decision. Non-serializable
/// handles (progress channel, tools) come from the current process's
/// registries — they were never in the checkpoint.
pub async fn resume_run(state: AppState, mut run: RunState, response: InterruptResponse) {
    let session_id = run.session_id.clone();
    let cancel = state.cancel_map.register(&session_id);
    let checkpointing = state.config.supervisor.enable_checkpointing;

    run.phase = Phase::Executing;
    let start_idx = run.interrupted_step.unwrap_or(0);
    run.interrupted_step = None;

    let resume_input = resume_input_for(&mut run, &state, &response);

    let result = async {
        match execute_teams(&state, &mut run, &cancel, checkpointing, start_idx, Some(resume_input))
            .await?
        {
            ExecFlow::Cancelled => {
                handle_cancellation(&state, &mut run, checkpointing);
                return Ok(());
            }
            ExecFlow::Finished => {}
        }
        aggregate_results(&state, &mut run, checkpointing);
        respond(&state, &mut run, checkpointing).await
    }
    .await;

    if let Err(e) = result {
        run.record_error(e.to_string());
        run.finish(Phase::Error);
        write_checkpoint(&state, &run, checkpointing);
        state.progress.emit(
            &session_id,
            ProgressEventKind::Error {
                error: "run failed".into(),
                details: Some(e.to_string()),
            },
        );
    }

    state.cancel_map.remove(&session_id);
}

/// Translate a review decision into the document team's resume inputs.
fn resume_input_for(run: &mut RunState, state: &AppState, response: &InterruptResponse) -> Value {
    match response.action {
        InterruptAction::Approve => json!({ "pre_approved": true }),
        InterruptAction::Reject => json!({ "pre_approved": true, "rejected": true }),
        InterruptAction::Modify => {
            if run.revision_count < state.config.teams.max_revisions {
                run.revision_count += 1;
                json!({
                    "feedback": response
                        .feedback
                        .clone()
                        .or_else(|| response.modifications.clone())
                        .unwrap_or_default()
                })
            } else {
                // Past the revision bound, modify acts as approve.
                json!({ "pre_approved": true })
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The phase graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_query_inner(
    state: &AppState,
    run: &mut RunState,
    cancel: &CancelToken,
    checkpointing: bool,
) -> Result<()> {
    let session_id = run.session_id.clone();

    // ── planning ──────────────────────────────────────────────────
    run.phase = Phase::Planning;
    state.progress.emit(
        &session_id,
        ProgressEventKind::PlanningStart {
            message: "질문을 분석하고 실행 계획을 세우고 있어요".into(),
        },
    );

    // Memory unavailability degrades the context, it does not kill the run.
    let memory_context = match &run.user_id {
        Some(user_id) => match state.memory.load_tiered(user_id, &session_id).await {
            Ok(memories) => memories.render_context(),
            Err(e) => {
                tracing::warn!(error = %e, "tiered memory load failed; continuing without context");
                String::new()
            }
        },
        None => String::new(),
    };

    if cancel.is_cancelled() {
        handle_cancellation(state, run, checkpointing);
        return Ok(());
    }

    let intent = state.planner.analyze_intent(&run.query, &memory_context).await?;
    let sub_queries = match state.planner.decompose_query(&run.query, &intent).await {
        Ok(subs) => subs,
        Err(e) => {
            tracing::warn!(error = %e, "query decomposition failed; planning without sub-queries");
            Vec::new()
        }
    };
    let plan = state.planner.create_plan(&intent, &sub_queries)?;

    run.plan = Some(plan.clone());
    write_checkpoint(state, run, checkpointing);
    state.progress.emit(
        &session_id,
        ProgressEventKind::PlanReady {
            intent: plan.intent_type.clone(),
            confidence: plan.confidence,
            execution_steps: plan.execution_steps.clone(),
            execution_strategy: plan.execution_strategy,
            estimated_total_time: plan.estimated_total_time_s,
            keywords: plan.keywords.clone(),
        },
    );

    // ── route: short-circuit straight to respond ──────────────────
    let short_circuit = state
        .config
        .planner
        .short_circuit_intents
        .contains(&plan.intent_type)
        || plan.execution_steps.is_empty();
    if short_circuit {
        return respond(state, run, checkpointing).await;
    }

    // ── execute ───────────────────────────────────────────────────
    run.phase = Phase::Executing;
    write_checkpoint(state, run, checkpointing);
    state.progress.emit(
        &session_id,
        ProgressEventKind::ExecutionStart {
            execution_steps: plan.execution_steps.clone(),
            intent: plan.intent_type.clone(),
            confidence: plan.confidence,
        },
    );

    match execute_teams(state, run, cancel, checkpointing, 0, None).await? {
        ExecFlow::Cancelled => {
            handle_cancellation(state, run, checkpointing);
            return Ok(());
        }
        ExecFlow::Finished => {}
    }

    // ── aggregate + respond ───────────────────────────────────────
    aggregate_results(state, run, checkpointing);
    respond(state, run, checkpointing).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execute
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn executor_for(team: Team) -> Box<dyn TeamExecutor> {
    match team {
        Team::Search => Box::new(SearchTeam),
        Team::Analysis => Box::new(AnalysisTeam),
        Team::Document => Box::new(DocumentTeam),
    }
}

/// Sequential hand-off projection: what team `k+1` receives from the
/// outputs accumulated so far.
fn input_data_for(team: Team, run: &RunState) -> Value {
    match team {
        Team::Search => json!({}),
        Team::Analysis => json!({
            "search_results": run
                .team_results
                .get(&Team::Search)
                .map(|r| r.output.clone())
                .unwrap_or(Value::Null),
        }),
        Team::Document => json!({
            "parameters": {},
            "search_results": run
                .team_results
                .get(&Team::Search)
                .map(|r| r.output.clone())
                .unwrap_or(Value::Null),
            "analysis": run
                .team_results
                .get(&Team::Analysis)
                .map(|r| r.output.clone())
                .unwrap_or(Value::Null),
        }),
    }
}

/// A team is reuse-eligible when it has tools and every tool opted in.
fn reuse_eligible(state: &AppState, team: Team) -> bool {
    let tools = state.tools.tools_for_tag(team.as_str());
    !tools.is_empty() && tools.iter().all(|t| t.metadata().reuse_eligible)
}

fn emit_todo(state: &AppState, run: &RunState) {
    if let Some(plan) = &run.plan {
        state.progress.emit(
            &run.session_id,
            ProgressEventKind::TodoUpdated {
                execution_steps: plan.execution_steps.clone(),
            },
        );
    }
}

fn apply_team_result(run: &mut RunState, step_idx: usize, team_state: TeamState) {
    let team = team_state.team;
    let status = team_state.status;
    let result = TeamResult {
        team,
        status,
        output: team_state.outputs.clone(),
        error: team_state.error.clone(),
        duration_ms: team_state.duration_ms(),
        reused: false,
    };

    if let Some(plan) = run.plan.as_mut() {
        if let Some(step) = plan.execution_steps.get_mut(step_idx) {
            match status {
                TeamStatus::Completed | TeamStatus::Running => step.advance(StepStatus::Completed),
                TeamStatus::Failed => {
                    step.error = team_state.error.clone();
                    step.advance(StepStatus::Failed);
                }
                TeamStatus::Skipped => step.advance(StepStatus::Skipped),
            }
            step.result = Some(team_state.outputs.clone());
        }
    }
    run.team_finished(result);
}

async fn execute_teams(
    state: &AppState,
    run: &mut RunState,
    cancel: &CancelToken,
    checkpointing: bool,
    start_idx: usize,
    mut resume_input: Option<Value>,
) -> Result<ExecFlow> {
    let plan = run
        .plan
        .clone()
        .ok_or_else(|| Error::Plan("execute reached without a plan".into()))?;

    match plan.execution_strategy {
        ExecutionStrategy::Parallel => {
            execute_parallel(state, run, cancel).await?;
        }
        ExecutionStrategy::Sequential | ExecutionStrategy::Pipeline => {
            for step_idx in start_idx..plan.execution_steps.len() {
                if cancel.is_cancelled() {
                    return Ok(ExecFlow::Cancelled);
                }
                let team = plan.execution_steps[step_idx].team;
                let mut input_data = input_data_for(team, run);
                if let Some(extra) = resume_input.take() {
                    if let (Some(obj), Some(extra)) =
                        (input_data.as_object_mut(), extra.as_object())
                    {
                        for (k, v) in extra {
                            obj.insert(k.clone(), v.clone());
                        }
                    }
                }

                // ── data reuse ────────────────────────────────────
                let fp_inputs = json!({ "query": run.query, "input": input_data });
                let fp = reuse::fingerprint(team, &fp_inputs);
                if reuse_eligible(state, team) {
                    if let Some(output) = state.reuse.lookup(&run.session_id, team, &fp) {
                        tracing::info!(team = %team, "reusing prior team output");
                        state.progress.emit(
                            &run.session_id,
                            ProgressEventKind::DataReuseNotification {
                                reused_teams: vec![team.as_str().to_string()],
                            },
                        );
                        run.team_started(team);
                        run.team_finished(TeamResult {
                            team,
                            status: TeamStatus::Completed,
                            output: output.clone(),
                            error: None,
                            duration_ms: 0,
                            reused: true,
                        });
                        if let Some(plan) = run.plan.as_mut() {
                            if let Some(step) = plan.execution_steps.get_mut(step_idx) {
                                step.advance(StepStatus::InProgress);
                                step.advance(StepStatus::Completed);
                                step.is_reused = true;
                                step.result = Some(output);
                            }
                        }
                        emit_todo(state, run);
                        continue;
                    }
                }

                // ── normal execution ──────────────────────────────
                run.team_started(team);
                if let Some(plan) = run.plan.as_mut() {
                    if let Some(step) = plan.execution_steps.get_mut(step_idx) {
                        step.advance(StepStatus::InProgress);
                    }
                }
                emit_todo(state, run);

                let team_state = if team == Team::Document {
                    match document_with_review(state, run, cancel, step_idx, input_data).await? {
                        Some(st) => st,
                        None => return Ok(ExecFlow::Cancelled),
                    }
                } else {
                    let ctx = TeamContext {
                        app: state.clone(),
                        run_id: run.run_id,
                        step_index: step_idx,
                        shared: shared_context(run),
                        input_data,
                        cancel: cancel.clone(),
                    };
                    let executor = executor_for(team);
                    match teams::run_team(executor.as_ref(), &ctx).await {
                        TeamRunOutcome::Done(st) => st,
                        TeamRunOutcome::NeedsReview { state: st, .. } => {
                            // Only the document team raises reviews.
                            tracing::warn!(team = %team, "unexpected review request; completing team");
                            st
                        }
                    }
                };

                if reuse_eligible(state, team) && team_state.status == TeamStatus::Completed {
                    state
                        .reuse
                        .record(&run.session_id, team, fp, team_state.outputs.clone());
                }
                apply_team_result(run, step_idx, team_state);
                emit_todo(state, run);
            }
        }
    }

    Ok(ExecFlow::Finished)
}

async fn execute_parallel(
    state: &AppState,
    run: &mut RunState,
    cancel: &CancelToken,
) -> Result<()> {
    let plan = run
        .plan
        .clone()
        .ok_or_else(|| Error::Plan("execute reached without a plan".into()))?;

    // All steps of the group start together.
    for (idx, _) in plan.execution_steps.iter().enumerate() {
        let team = plan.execution_steps[idx].team;
        run.team_started(team);
        if let Some(p) = run.plan.as_mut() {
            if let Some(step) = p.execution_steps.get_mut(idx) {
                step.advance(StepStatus::InProgress);
            }
        }
    }
    emit_todo(state, run);

    let futures: Vec<_> = plan
        .execution_steps
        .iter()
        .enumerate()
        .map(|(idx, step)| {
            let ctx = TeamContext {
                app: state.clone(),
                run_id: run.run_id,
                step_index: idx,
                shared: shared_context(run),
                input_data: json!({}),
                cancel: cancel.clone(),
            };
            let team = step.team;
            async move {
                let executor = executor_for(team);
                let outcome = teams::run_team(executor.as_ref(), &ctx).await;
                (idx, outcome)
            }
        })
        .collect();

    // The group completes when every member terminates, success or not.
    let outcomes = futures_util::future::join_all(futures).await;
    for (idx, outcome) in outcomes {
        let team_state = match outcome {
            TeamRunOutcome::Done(st) => st,
            TeamRunOutcome::NeedsReview { state: st, .. } => st,
        };
        apply_team_result(run, idx, team_state);
        emit_todo(state, run);
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Document review loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drive the document team through generate → review, looping on modify
/// requests bounded by `max_revisions`. Returns `None` on cancellation.
async fn document_with_review(
    state: &AppState,
    run: &mut RunState,
    cancel: &CancelToken,
    step_idx: usize,
    mut input_data: Value,
) -> Result<Option<TeamState>> {
    let checkpointing = state.config.supervisor.enable_checkpointing;
    let session_id = run.session_id.clone();
    let mut entries: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        entries += 1;
        if entries > state.config.supervisor.max_recursion {
            return Err(Error::Other(format!(
                "document generation exceeded {} graph re-entries",
                state.config.supervisor.max_recursion
            )));
        }

        let ctx = TeamContext {
            app: state.clone(),
            run_id: run.run_id,
            step_index: step_idx,
            shared: shared_context(run),
            input_data: input_data.clone(),
            cancel: cancel.clone(),
        };

        match teams::run_team(&DocumentTeam, &ctx).await {
            TeamRunOutcome::Done(mut st) => {
                // The rejected-resume path regenerates then discards.
                if input_data.get("rejected").and_then(Value::as_bool) == Some(true) {
                    teams::document::apply_review_result(&mut st, "reject", None);
                    st.finalize(TeamStatus::Skipped);
                }
                return Ok(Some(st));
            }
            TeamRunOutcome::NeedsReview {
                state: mut st,
                request,
            } => {
                // ── pause ─────────────────────────────────────────
                run.interrupted_step = Some(step_idx);
                run.phase = Phase::Interrupted;
                write_checkpoint(state, run, checkpointing);

                let rx = state.interrupts.insert(&session_id, request.clone());
                state.progress.emit(
                    &session_id,
                    ProgressEventKind::WorkflowInterrupted {
                        interrupt_data: request.content.clone(),
                        interrupted_by: request.interrupted_by.clone(),
                        interrupt_type: request.interrupt_type.clone(),
                        message: request.message.clone(),
                    },
                );

                let timeout = Duration::from_secs(state.config.teams.interrupt_timeout_s);
                let wait = state.interrupts.wait(rx, timeout).await;

                // ── resume ────────────────────────────────────────
                run.phase = Phase::Executing;
                run.interrupted_step = None;
                write_checkpoint(state, run, checkpointing);

                match wait {
                    InterruptWait::Resolved(resp) => match resp.action {
                        InterruptAction::Approve => {
                            teams::document::apply_review_result(&mut st, "approve", None);
                            st.finalize(TeamStatus::Completed);
                            return Ok(Some(st));
                        }
                        InterruptAction::Reject => {
                            teams::document::apply_review_result(&mut st, "reject", None);
                            st.finalize(TeamStatus::Skipped);
                            return Ok(Some(st));
                        }
                        InterruptAction::Modify => {
                            if run.revision_count < state.config.teams.max_revisions {
                                run.revision_count += 1;
                                input_data["feedback"] = json!(resp
                                    .feedback
                                    .or(resp.modifications)
                                    .unwrap_or_default());
                                continue;
                            }
                            // Past the bound, modify acts as approve.
                            tracing::info!(
                                max_revisions = state.config.teams.max_revisions,
                                "revision limit reached; treating modify as approve"
                            );
                            teams::document::apply_review_result(
                                &mut st,
                                "approve",
                                Some("revision limit reached"),
                            );
                            st.finalize(TeamStatus::Completed);
                            return Ok(Some(st));
                        }
                    },
                    InterruptWait::Expired => {
                        state.interrupts.remove(&session_id);
                        st.error = Some(HITL_EXPIRED.into());
                        st.finalize(TeamStatus::Failed);
                        run.record_error(HITL_EXPIRED.to_string());
                        return Ok(Some(st));
                    }
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregate + respond
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn aggregate_results(state: &AppState, run: &mut RunState, checkpointing: bool) {
    run.phase = Phase::Aggregation;
    state.progress.emit(
        &run.session_id,
        ProgressEventKind::ResponseGeneratingStart {
            phase: RespondPhase::Aggregation,
            message: Some("수집한 결과를 정리하고 있어요".into()),
        },
    );

    let mut merged = serde_json::Map::new();
    let mut sources = Vec::new();
    for (team, result) in &run.team_results {
        merged.insert(team.as_str().to_string(), result.output.clone());
        if result.status == TeamStatus::Completed {
            sources.push(team.as_str().to_string());
        }
    }

    let confidence = run.plan.as_ref().map(|p| p.confidence).unwrap_or(0.0);
    run.aggregated = Some(json!({
        "results": Value::Object(merged),
        "confidence": confidence,
        "sources": sources,
        "failed_teams": run
            .failed_teams
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>(),
    }));
    write_checkpoint(state, run, checkpointing);
}

async fn respond(state: &AppState, run: &mut RunState, checkpointing: bool) -> Result<()> {
    let session_id = run.session_id.clone();
    let intent_type = run
        .plan
        .as_ref()
        .map(|p| p.intent_type.clone())
        .unwrap_or_else(|| "unclear".into());

    run.phase = Phase::ResponseGeneration;

    let short_circuit = state
        .config
        .planner
        .short_circuit_intents
        .contains(&intent_type)
        || run
            .plan
            .as_ref()
            .is_some_and(|p| p.execution_steps.is_empty());
    let hitl_expired = run
        .team_results
        .values()
        .any(|r| r.error.as_deref() == Some(HITL_EXPIRED));

    let response = if short_circuit {
        formatter::guidance_response(&state.prompts, &intent_type)
    } else if hitl_expired {
        let mut resp = formatter::guidance_response(&state.prompts, "hitl_expired");
        resp.message = Some(
            "문서 검토 요청이 만료되어 작업이 취소되었습니다. 다시 요청해 주세요.".into(),
        );
        resp
    } else {
        state.progress.emit(
            &session_id,
            ProgressEventKind::ResponseGeneratingProgress {
                phase: RespondPhase::ResponseGeneration,
            },
        );
        let aggregated = run.aggregated.clone().unwrap_or_else(|| json!({}));
        let sources = aggregated
            .get("sources")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let confidence = run.plan.as_ref().map(|p| p.confidence).unwrap_or(0.0);

        formatter::synthesize_answer(
            &state.llm,
            &state.prompts,
            &run.query,
            &intent_type,
            confidence,
            sources,
            &aggregated,
        )
        .await?
    };

    // Persist the exchange; history loss degrades memory, not the turn.
    if let Err(e) = state.store.append_message(&session_id, "user", &run.query, None) {
        tracing::warn!(error = %e, "failed to persist user message");
    }
    let assistant_text = response
        .answer
        .clone()
        .or_else(|| response.message.clone())
        .unwrap_or_default();
    let structured = response
        .structured_data
        .as_ref()
        .and_then(|s| serde_json::to_value(s).ok());
    if let Err(e) = state.store.append_message(
        &session_id,
        "assistant",
        &assistant_text,
        structured.as_ref(),
    ) {
        tracing::warn!(error = %e, "failed to persist assistant message");
    }

    run.answer = response.structured_data.clone();
    state.progress.emit(
        &session_id,
        ProgressEventKind::FinalResponse { response },
    );

    run.finish(Phase::Completed);
    write_checkpoint(state, run, checkpointing);

    // Fire-and-forget: summarize this session in the background.
    if let Some(user_id) = &run.user_id {
        state
            .memory
            .spawn_background_summarize(session_id.clone(), user_id.clone());
    }

    tracing::debug!("run completed");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn shared_context(run: &RunState) -> SharedContext {
    SharedContext::new(
        &run.query,
        &run.session_id,
        run.user_id.clone(),
        &run.language,
    )
}

fn write_checkpoint(state: &AppState, run: &RunState, enabled: bool) {
    if !enabled {
        return;
    }
    match serde_json::to_vec(run) {
        Ok(bytes) => {
            if let Err(e) = state.store.write_checkpoint(&run.session_id, &bytes, None) {
                tracing::warn!(error = %e, "checkpoint write failed");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "run state serialization failed");
        }
    }
}

/// The channel closed (or the store broke) before a run object existed.
fn fail_run_early(state: &AppState, session_id: &str, error: &Error) {
    state.progress.emit(
        session_id,
        ProgressEventKind::Error {
            error: "run initialization failed".into(),
            details: Some(error.to_string()),
        },
    );
}

/// Channel-close policy: checkpoint the run as interrupted for later
/// replay, or discard. No events — the channel is already gone.
fn handle_cancellation(state: &AppState, run: &mut RunState, checkpointing: bool) {
    use zipsa_domain::config::DisconnectPolicy;
    tracing::info!(session_id = %run.session_id, "run cancelled");
    match state.config.supervisor.on_disconnect {
        DisconnectPolicy::Checkpoint => {
            run.finish(Phase::Interrupted);
            write_checkpoint(state, run, checkpointing);
        }
        DisconnectPolicy::Discard => {}
    }
    state.interrupts.remove(&run.session_id);
}
