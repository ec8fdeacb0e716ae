//! End-to-end supervisor scenarios driven by a scripted LLM and
//! recording tools: guidance short-circuit, single-team answers,
//! sequential hand-off, document review (approve / modify / duplicate
//! responses), and cross-run data reuse.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use zipsa_domain::config::{Config, IntentSpec};
use zipsa_domain::error::Result;
use zipsa_domain::event::{ProgressEvent, ProgressEventKind};
use zipsa_domain::interrupt::{InterruptAction, InterruptResponse};
use zipsa_domain::team::ToolOutcome;
use zipsa_gateway::runtime::cancel::CancelMap;
use zipsa_gateway::runtime::decision_log::DecisionLog;
use zipsa_gateway::runtime::interrupts::InterruptStore;
use zipsa_gateway::runtime::planner::Planner;
use zipsa_gateway::runtime::progress::ProgressBus;
use zipsa_gateway::runtime::reuse::ReuseCache;
use zipsa_gateway::runtime::supervisor::{self, QueryInput};
use zipsa_gateway::state::AppState;
use zipsa_llm::{LlmGateway, MockLlm, PromptStore};
use zipsa_memory::{FixedCounter, MemoryService};
use zipsa_store::Store;
use zipsa_tools::{Tool, ToolMetadata, ToolRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A scripted tool that records its invocations.
struct RecordingTool {
    meta: ToolMetadata,
    calls: Arc<AtomicUsize>,
    inputs_seen: Arc<Mutex<Vec<Value>>>,
    respond: Box<dyn Fn(&Value) -> ToolOutcome + Send + Sync>,
}

#[async_trait::async_trait]
impl Tool for RecordingTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.meta
    }
    async fn execute(&self, inputs: &Value) -> Result<ToolOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs_seen.lock().push(inputs.clone());
        Ok((self.respond)(inputs))
    }
}

struct ToolHandle {
    calls: Arc<AtomicUsize>,
    inputs_seen: Arc<Mutex<Vec<Value>>>,
}

fn recording_tool(
    registry: &ToolRegistry,
    name: &str,
    tag: &str,
    reuse_eligible: bool,
    respond: impl Fn(&Value) -> ToolOutcome + Send + Sync + 'static,
) -> ToolHandle {
    let calls = Arc::new(AtomicUsize::new(0));
    let inputs_seen = Arc::new(Mutex::new(Vec::new()));
    registry.register(Arc::new(RecordingTool {
        meta: ToolMetadata {
            name: name.into(),
            description: format!("{name} (test)"),
            tags: vec![tag.into()],
            input_schema: json!({"type": "object"}),
            reuse_eligible,
        },
        calls: calls.clone(),
        inputs_seen: inputs_seen.clone(),
        respond: Box::new(respond),
    }));
    ToolHandle { calls, inputs_seen }
}

fn intent_spec(name: &str, agents: &[&str]) -> IntentSpec {
    IntentSpec {
        name: name.into(),
        display_name: name.into(),
        keywords: vec![],
        confidence_threshold: 0.5,
        suggested_agents: agents.iter().map(|s| s.to_string()).collect(),
        priority: 0,
        task_labels: Default::default(),
        execution_strategy: None,
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.intents = vec![
        intent_spec("legal_consult", &["search"]),
        intent_spec("comprehensive", &["search", "analysis"]),
        intent_spec("document_creation", &["document"]),
        intent_spec("irrelevant", &[]),
        intent_spec("unclear", &[]),
    ];
    config.teams.max_revisions = 1;
    config.teams.interrupt_timeout_s = 5;
    config
}

struct Harness {
    state: AppState,
    mock: MockLlm,
    events: mpsc::Receiver<ProgressEvent>,
    session_id: String,
    _decisions_dir: tempfile::TempDir,
}

fn build_harness(config: Config) -> Harness {
    let mock = MockLlm::new();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let prompts = Arc::new(
        PromptStore::load(&zipsa_domain::config::PromptsConfig {
            path: "/nonexistent".into(),
            hot_reload: false,
        })
        .unwrap(),
    );
    for name in [
        "intent_analysis",
        "keyword_extraction",
        "tool_selection_search",
        "tool_selection_analysis",
        "tool_selection_document",
        "insight_generation",
        "response_synthesis",
        "conversation_summary",
        "query_decomposition",
    ] {
        prompts.register(name, format!("{name}: {{query}}"));
    }
    prompts.register("lease_contract", "임대인: {landlord}");

    let config = Arc::new(config);
    let llm = Arc::new(LlmGateway::new(Arc::new(mock.clone()), {
        let mut llm_config = config.llm.clone();
        llm_config.max_retries = 0;
        llm_config
    }));
    let memory = Arc::new(MemoryService::new(
        store.clone(),
        llm.clone(),
        prompts.clone(),
        config.memory.clone(),
        Arc::new(FixedCounter { per_word: 1 }),
    ));
    let tools = Arc::new(ToolRegistry::new());
    let decisions_dir = tempfile::tempdir().unwrap();

    let state = AppState {
        config: config.clone(),
        store: store.clone(),
        llm: llm.clone(),
        prompts: prompts.clone(),
        memory,
        tools,
        decisions: Arc::new(DecisionLog::new(decisions_dir.path()).unwrap()),
        planner: Arc::new(Planner::new(llm, prompts, config.clone())),
        progress: Arc::new(ProgressBus::new()),
        interrupts: Arc::new(InterruptStore::new()),
        cancel_map: Arc::new(CancelMap::new()),
        reuse: Arc::new(ReuseCache::new(config.teams.reuse_window)),
    };

    let session = store.create_session(None, 60).unwrap();
    let (tx, rx) = mpsc::channel(256);
    state.progress.register(&session.session_id, tx);

    Harness {
        state,
        mock,
        events: rx,
        session_id: session.session_id,
        _decisions_dir: decisions_dir,
    }
}

fn drain(events: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn types(events: &[ProgressEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event_type()).collect()
}

async fn next_of_type(
    events: &mut mpsc::Receiver<ProgressEvent>,
    wanted: &str,
) -> ProgressEvent {
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if event.event_type() == wanted {
            return event;
        }
        assert_ne!(
            event.event_type(),
            "final_response",
            "final_response arrived before {wanted}"
        );
    }
}

fn query_input(harness: &Harness, query: &str) -> QueryInput {
    QueryInput {
        session_id: harness.session_id.clone(),
        user_id: None,
        query: query.into(),
        enable_checkpointing: None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S1 — guidance short-circuit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn guidance_short_circuit() {
    let mut h = build_harness(test_config());
    h.mock.push_json(json!({
        "intent_type": "irrelevant",
        "confidence": 0.9,
        "keywords": [],
        "entities": []
    }));

    supervisor::run_query(h.state.clone(), query_input(&h, "hello")).await;

    let events = drain(&mut h.events);
    assert_eq!(
        types(&events),
        vec!["planning_start", "plan_ready", "final_response"]
    );

    match &events[1].kind {
        ProgressEventKind::PlanReady {
            intent,
            execution_steps,
            ..
        } => {
            assert_eq!(intent, "irrelevant");
            assert!(execution_steps.is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match &events[2].kind {
        ProgressEventKind::FinalResponse { response } => {
            assert_eq!(
                serde_json::to_value(response).unwrap()["type"],
                "guidance"
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Exactly one LLM call: intent analysis.
    assert_eq!(h.mock.call_count(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S2 — single-team simple answer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn single_team_legal_answer() {
    let mut h = build_harness(test_config());
    let legal = recording_tool(&h.state.tools, "legal_search", "search", true, |_| {
        ToolOutcome::success(json!({"results": [{"content": "5% 한도"}]}))
    });

    h.mock.push_json(json!({
        "intent_type": "legal_consult",
        "confidence": 0.92,
        "keywords": ["전세금", "인상"],
        "entities": []
    }));
    h.mock.push_json(json!({"keywords": {"legal_search": ["전세금", "인상"]}}));
    h.mock.push_json(json!({
        "selected_tools": ["legal_search"],
        "reasoning": "법률 질의",
        "confidence": 0.9
    }));
    h.mock.push_json(json!({
        "answer": "전세금 인상 한도는 5%입니다.",
        "sections": [
            {"title": "핵심 답변", "content": "전세금 인상 한도는 5%입니다.", "priority": "high"}
        ]
    }));

    supervisor::run_query(h.state.clone(), query_input(&h, "전세금 인상 한도는?")).await;

    let events = drain(&mut h.events);
    let filtered: Vec<&'static str> = types(&events)
        .into_iter()
        .filter(|t| *t != "agent_step_progress")
        .collect();
    assert_eq!(
        filtered,
        vec![
            "planning_start",
            "plan_ready",
            "execution_start",
            "todo_updated",
            "todo_updated",
            "response_generating_start",
            "response_generating_progress",
            "final_response",
        ]
    );

    // First todo_updated: step in progress. Second: completed at 100%.
    let todo_events: Vec<&ProgressEvent> = events
        .iter()
        .filter(|e| e.event_type() == "todo_updated")
        .collect();
    match &todo_events[1].kind {
        ProgressEventKind::TodoUpdated { execution_steps } => {
            assert_eq!(execution_steps[0].progress_percentage, 100);
            assert!(execution_steps[0].completed_at.is_some());
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Lead section title.
    let final_event = events.last().unwrap();
    match &final_event.kind {
        ProgressEventKind::FinalResponse { response } => {
            let sections = &response.structured_data.as_ref().unwrap().sections;
            assert_eq!(sections[0].title, "핵심 답변");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert_eq!(legal.calls.load(Ordering::SeqCst), 1);
    // intent_analysis, keyword_extraction, tool_selection_search,
    // response_synthesis.
    assert_eq!(h.mock.call_count(), 4);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S3 — sequential hand-off from search to analysis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn sequential_handoff_feeds_analysis() {
    let mut h = build_harness(test_config());
    recording_tool(&h.state.tools, "legal_search", "search", true, |_| {
        ToolOutcome::success(json!({"legal_results": ["임대차보호법 5%"]}))
    });
    recording_tool(&h.state.tools, "real_estate_search", "search", true, |_| {
        ToolOutcome::success(json!({"market_results": ["강남 시세 상승"]}))
    });
    let market = recording_tool(&h.state.tools, "market_data", "analysis", false, |_| {
        ToolOutcome::success(json!({"market": {"강남구": {"trend": "+1.4%"}}}))
    });

    h.mock.push_json(json!({
        "intent_type": "comprehensive",
        "confidence": 0.85,
        "keywords": ["전세", "시세"],
        "entities": []
    }));
    // comprehensive intents decompose first.
    h.mock.push_json(json!({"sub_queries": ["전세 법률", "시세 분석"]}));
    h.mock.push_json(json!({"keywords": {}}));
    h.mock.push_json(json!({
        "selected_tools": ["legal_search", "real_estate_search"],
        "reasoning": "둘 다 필요",
        "confidence": 0.8
    }));
    h.mock.push_json(json!({
        "selected_tools": ["market_data"],
        "reasoning": "시세 분석",
        "confidence": 0.8
    }));
    h.mock.push_json(json!({
        "insights": ["법률과 시세 모두 검토됨"],
        "report": "legal_results와 market_results를 종합한 분석",
        "confidence": 0.8
    }));
    h.mock.push_json(json!({
        "answer": "종합 분석 결과입니다.",
        "sections": [{"title": "핵심 답변", "content": "종합 분석 결과입니다."}]
    }));

    supervisor::run_query(h.state.clone(), query_input(&h, "전세 법률과 시세를 종합해줘")).await;

    let events = drain(&mut h.events);

    // Step 0 completes before step 1 starts.
    let mut saw_step0_complete = false;
    let mut step1_started_after = false;
    for event in &events {
        if let ProgressEventKind::TodoUpdated { execution_steps } = &event.kind {
            if execution_steps[0].status == zipsa_domain::plan::StepStatus::Completed
                && execution_steps[1].status == zipsa_domain::plan::StepStatus::Pending
            {
                saw_step0_complete = true;
            }
            if execution_steps[1].status == zipsa_domain::plan::StepStatus::InProgress {
                step1_started_after = saw_step0_complete;
            }
        }
    }
    assert!(saw_step0_complete, "step 0 never completed before step 1");
    assert!(step1_started_after, "step 1 started before step 0 completed");

    // The analysis tool received the search output as input data.
    let inputs = market.inputs_seen.lock();
    let search_results = &inputs[0]["search_results"];
    assert_eq!(search_results["legal_search"]["legal_results"][0], "임대차보호법 5%");
    assert_eq!(
        search_results["real_estate_search"]["market_results"][0],
        "강남 시세 상승"
    );

    // The insight step saw both result sets.
    let final_event = events.last().unwrap();
    assert_eq!(final_event.event_type(), "final_response");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S4 — document review: approve, then a duplicate response is ignored
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn document_review_approve_and_duplicate_response() {
    let mut h = build_harness(test_config());
    recording_tool(&h.state.tools, "document_renderer", "document", false, |_| {
        ToolOutcome::success(json!({"document": "임대차 계약서 초안"}))
    });

    h.mock.push_json(json!({
        "intent_type": "document_creation",
        "confidence": 0.9,
        "keywords": ["계약서"],
        "entities": []
    }));
    h.mock.push_json(json!({
        "selected_tools": ["document_renderer"],
        "reasoning": "문서 생성",
        "confidence": 0.9
    }));
    h.mock.push_json(json!({
        "answer": "계약서가 준비되었습니다.",
        "sections": [{"title": "핵심 답변", "content": "계약서가 준비되었습니다."}]
    }));

    let state = h.state.clone();
    let input = query_input(&h, "임대차 계약서 만들어줘");
    let run_task = tokio::spawn(async move {
        supervisor::run_query(state, input).await;
    });

    let interrupted = next_of_type(&mut h.events, "workflow_interrupted").await;
    match &interrupted.kind {
        ProgressEventKind::WorkflowInterrupted { interrupt_type, .. } => {
            assert_eq!(interrupt_type, "document_review");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Approve.
    assert!(h.state.interrupts.deliver(
        &h.session_id,
        InterruptResponse {
            action: InterruptAction::Approve,
            feedback: None,
            modifications: None,
        }
    ));

    run_task.await.unwrap();
    let events = drain(&mut h.events);
    assert!(events.iter().any(|e| e.event_type() == "final_response"));

    // A second interrupt_response finds nothing to resolve.
    assert!(!h.state.interrupts.deliver(
        &h.session_id,
        InterruptResponse {
            action: InterruptAction::Reject,
            feedback: None,
            modifications: None,
        }
    ));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S5 — document review: modify loop bounded by max_revisions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn document_review_modify_regenerates_then_bound_applies() {
    let mut h = build_harness(test_config());
    // Draft content reflects reviewer feedback on regeneration.
    recording_tool(&h.state.tools, "document_renderer", "document", false, |inputs| {
        let feedback = inputs["parameters"]["reviewer_feedback"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let draft = if feedback.is_empty() {
            "초안 v1".to_string()
        } else {
            format!("초안 v2 ({feedback})")
        };
        ToolOutcome::success(json!({ "document": draft }))
    });

    h.mock.push_json(json!({
        "intent_type": "document_creation",
        "confidence": 0.9,
        "keywords": [],
        "entities": []
    }));
    // One selection per generation: initial + one regeneration.
    h.mock.push_json(json!({
        "selected_tools": ["document_renderer"], "reasoning": "", "confidence": 0.9
    }));
    h.mock.push_json(json!({
        "selected_tools": ["document_renderer"], "reasoning": "", "confidence": 0.9
    }));
    h.mock.push_json(json!({
        "answer": "수정된 계약서입니다.",
        "sections": [{"title": "핵심 답변", "content": "수정된 계약서입니다."}]
    }));

    let state = h.state.clone();
    let input = query_input(&h, "임대차 계약서 만들어줘");
    let run_task = tokio::spawn(async move {
        supervisor::run_query(state, input).await;
    });

    // First pause: the v1 draft.
    let first = next_of_type(&mut h.events, "workflow_interrupted").await;
    let first_draft = match &first.kind {
        ProgressEventKind::WorkflowInterrupted { interrupt_data, .. } => {
            interrupt_data["draft"].as_str().unwrap().to_string()
        }
        other => panic!("unexpected event: {other:?}"),
    };
    assert_eq!(first_draft, "초안 v1");

    h.state.interrupts.deliver(
        &h.session_id,
        InterruptResponse {
            action: InterruptAction::Modify,
            feedback: Some("월세를 100만원으로".into()),
            modifications: None,
        },
    );

    // Second pause: the regenerated draft includes the feedback.
    let second = next_of_type(&mut h.events, "workflow_interrupted").await;
    let second_draft = match &second.kind {
        ProgressEventKind::WorkflowInterrupted { interrupt_data, .. } => {
            interrupt_data["draft"].as_str().unwrap().to_string()
        }
        other => panic!("unexpected event: {other:?}"),
    };
    assert_ne!(second_draft, first_draft);
    assert!(second_draft.contains("월세를 100만원으로"));

    // max_revisions = 1 in the test config: this modify acts as approve.
    h.state.interrupts.deliver(
        &h.session_id,
        InterruptResponse {
            action: InterruptAction::Modify,
            feedback: Some("또 수정".into()),
            modifications: None,
        },
    );

    run_task.await.unwrap();
    let events = drain(&mut h.events);
    assert!(events.iter().any(|e| e.event_type() == "final_response"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S6 — data reuse across back-to-back runs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn data_reuse_skips_search_on_identical_inputs() {
    let mut h = build_harness(test_config());
    let legal = recording_tool(&h.state.tools, "legal_search", "search", true, |_| {
        ToolOutcome::success(json!({"results": [{"content": "5% 한도"}]}))
    });

    let intent = json!({
        "intent_type": "legal_consult",
        "confidence": 0.92,
        "keywords": ["전세금"],
        "entities": []
    });
    let synthesis = json!({
        "answer": "전세금 인상 한도는 5%입니다.",
        "sections": [{"title": "핵심 답변", "content": "전세금 인상 한도는 5%입니다."}]
    });

    // ── run 1: normal execution ───────────────────────────────────
    h.mock.push_json(intent.clone());
    h.mock.push_json(json!({"keywords": {}}));
    h.mock.push_json(json!({
        "selected_tools": ["legal_search"], "reasoning": "", "confidence": 0.9
    }));
    h.mock.push_json(synthesis.clone());

    supervisor::run_query(h.state.clone(), query_input(&h, "전세금 인상 한도는?")).await;
    let run1_events = drain(&mut h.events);
    assert!(run1_events.iter().all(|e| e.event_type() != "data_reuse_notification"));
    let run1_output = run1_events
        .iter()
        .rev()
        .find_map(|e| match &e.kind {
            ProgressEventKind::TodoUpdated { execution_steps } => {
                execution_steps[0].result.clone()
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(legal.calls.load(Ordering::SeqCst), 1);

    // ── run 2: same query, search reused ──────────────────────────
    h.mock.push_json(intent);
    h.mock.push_json(synthesis);

    supervisor::run_query(h.state.clone(), query_input(&h, "전세금 인상 한도는?")).await;
    let run2_events = drain(&mut h.events);

    // Notification precedes the completed todo_updated with isReused.
    let notif_idx = run2_events
        .iter()
        .position(|e| e.event_type() == "data_reuse_notification")
        .expect("no data_reuse_notification");
    match &run2_events[notif_idx].kind {
        ProgressEventKind::DataReuseNotification { reused_teams } => {
            assert_eq!(reused_teams, &vec!["search".to_string()]);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let todo_idx = run2_events
        .iter()
        .position(|e| match &e.kind {
            ProgressEventKind::TodoUpdated { execution_steps } => {
                execution_steps[0].is_reused
                    && execution_steps[0].status == zipsa_domain::plan::StepStatus::Completed
            }
            _ => false,
        })
        .expect("no reused todo_updated");
    assert!(notif_idx < todo_idx);

    // Byte-identical payload and no second tool invocation.
    let run2_output = match &run2_events[todo_idx].kind {
        ProgressEventKind::TodoUpdated { execution_steps } => {
            execution_steps[0].result.clone().unwrap()
        }
        _ => unreachable!(),
    };
    assert_eq!(run2_output, run1_output);
    assert_eq!(legal.calls.load(Ordering::SeqCst), 1);

    // Run 2 skipped keyword extraction and tool selection:
    // intent + synthesis only.
    assert_eq!(h.mock.call_count(), 6);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-selection safety net
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn selector_failure_falls_back_to_all_tools() {
    let mut h = build_harness(test_config());
    let legal = recording_tool(&h.state.tools, "legal_search", "search", true, |_| {
        ToolOutcome::success(json!({"results": []}))
    });
    let loan = recording_tool(&h.state.tools, "loan_search", "search", true, |_| {
        ToolOutcome::success(json!({"results": []}))
    });

    h.mock.push_json(json!({
        "intent_type": "legal_consult",
        "confidence": 0.9,
        "keywords": [],
        "entities": []
    }));
    h.mock.push_json(json!({"keywords": {}}));
    // The selection call fails; the team must invoke the full tool set.
    h.mock.push_error("selector unavailable");
    h.mock.push_json(json!({
        "answer": "답변",
        "sections": [{"title": "핵심 답변", "content": "답변"}]
    }));

    supervisor::run_query(h.state.clone(), query_input(&h, "전세 대출 법률")).await;
    let events = drain(&mut h.events);

    // Never raises: the run completes with a final_response.
    assert_eq!(events.last().unwrap().event_type(), "final_response");
    assert_eq!(legal.calls.load(Ordering::SeqCst), 1);
    assert_eq!(loan.calls.load(Ordering::SeqCst), 1);

    // The fallback is recorded in the decision log.
    let decisions = h.state.decisions.recent(1);
    assert!(decisions[0].fallback);
    assert_eq!(decisions[0].confidence, 0.3);
    assert_eq!(decisions[0].selected_tools.len(), 2);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Checkpoint round-trip across phases
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn checkpoints_form_replayable_history() {
    let mut h = build_harness(test_config());
    recording_tool(&h.state.tools, "legal_search", "search", true, |_| {
        ToolOutcome::success(json!({"results": []}))
    });

    h.mock.push_json(json!({
        "intent_type": "legal_consult",
        "confidence": 0.9,
        "keywords": [],
        "entities": []
    }));
    h.mock.push_json(json!({"keywords": {}}));
    h.mock.push_json(json!({
        "selected_tools": ["legal_search"], "reasoning": "", "confidence": 0.9
    }));
    h.mock.push_json(json!({
        "answer": "답변",
        "sections": [{"title": "핵심 답변", "content": "답변"}]
    }));

    supervisor::run_query(h.state.clone(), query_input(&h, "전세금?")).await;
    drain(&mut h.events);

    let latest = h.state.store.latest_checkpoint(&h.session_id).unwrap().unwrap();
    let run: zipsa_domain::run::RunState =
        serde_json::from_value(latest.state_json().unwrap()).unwrap();
    assert_eq!(run.phase, zipsa_domain::run::Phase::Completed);
    assert!(run.partition_holds());
    assert!(run.completed_teams.contains(&zipsa_domain::plan::Team::Search));
    // The chain is linear back to the initial checkpoint.
    let mut cursor = latest;
    let mut depth = 0;
    while let Some(parent) = cursor.parent_checkpoint_id.clone() {
        cursor = h
            .state
            .store
            .get_checkpoint(&h.session_id, &parent)
            .unwrap()
            .unwrap();
        depth += 1;
        assert!(depth < 32, "checkpoint chain does not terminate");
    }
    assert!(depth >= 2, "expected checkpoints at multiple phases");
}
