//! The planning agent: intent classification, optional query
//! decomposition, and deterministic plan synthesis.
//!
//! The classifier is an LLM call fed the configured intent vocabulary;
//! everything after it — team selection, ordering, strategy — is a pure
//! function of the intent result and the configuration, so the planner
//! is fully testable without an LLM.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use zipsa_domain::config::Config;
use zipsa_domain::error::{Error, Result};
use zipsa_domain::plan::{ExecutionStep, ExecutionStrategy, Plan, Team};
use zipsa_llm::prompts::vars;
use zipsa_llm::{ChatMessage, LlmGateway, PromptStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Planner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Planner {
    llm: Arc<LlmGateway>,
    prompts: Arc<PromptStore>,
    config: Arc<Config>,
}

impl Planner {
    pub fn new(llm: Arc<LlmGateway>, prompts: Arc<PromptStore>, config: Arc<Config>) -> Self {
        Self {
            llm,
            prompts,
            config,
        }
    }

    /// Classify the query against the configured vocabulary. A response
    /// whose intent is unknown, or whose confidence is below the floor,
    /// reclassifies to `unclear`.
    pub async fn analyze_intent(&self, query: &str, memory_context: &str) -> Result<IntentResult> {
        let vocabulary: Vec<Value> = self
            .config
            .intents
            .iter()
            .map(|i| {
                serde_json::json!({
                    "name": i.name,
                    "display_name": i.display_name,
                    "keywords": i.keywords,
                })
            })
            .collect();

        let prompt = self.prompts.render(
            "intent_analysis",
            &vars([
                ("query", query.to_string()),
                ("intents", serde_json::to_string(&vocabulary)?),
                ("memory", memory_context.to_string()),
            ]),
        )?;

        let raw = self
            .llm
            .chat_json("intent_analysis", vec![ChatMessage::user(prompt)])
            .await?;
        let mut result: IntentResult = serde_json::from_value(raw).map_err(|e| {
            Error::Plan(format!("intent classifier returned an unusable payload: {e}"))
        })?;

        if self.config.intent(&result.intent_type).is_none() {
            tracing::warn!(
                intent = %result.intent_type,
                "classifier produced an intent outside the vocabulary; reclassifying as unclear"
            );
            result.intent_type = "unclear".into();
            return Ok(result);
        }

        let floor = self
            .config
            .intent(&result.intent_type)
            .map(|i| i.confidence_threshold)
            .unwrap_or(self.config.planner.confidence_floor);
        if result.confidence < floor {
            tracing::debug!(
                intent = %result.intent_type,
                confidence = result.confidence,
                floor,
                "confidence below floor; reclassifying as unclear"
            );
            result.intent_type = "unclear".into();
        }

        Ok(result)
    }

    /// Decompose a comprehensive query into sub-queries. Only runs for
    /// intents in `planner.decompose_intents`.
    pub async fn decompose_query(&self, query: &str, intent: &IntentResult) -> Result<Vec<String>> {
        if !self
            .config
            .planner
            .decompose_intents
            .contains(&intent.intent_type)
        {
            return Ok(Vec::new());
        }

        let prompt = self.prompts.render(
            "query_decomposition",
            &vars([
                ("query", query.to_string()),
                ("intent", intent.intent_type.clone()),
            ]),
        )?;
        let raw = self
            .llm
            .chat_json("query_decomposition", vec![ChatMessage::user(prompt)])
            .await?;
        Ok(raw
            .get("sub_queries")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Deterministically map an intent result to a plan. Pure — no LLM.
    pub fn create_plan(&self, intent: &IntentResult, sub_queries: &[String]) -> Result<Plan> {
        if self
            .config
            .planner
            .short_circuit_intents
            .contains(&intent.intent_type)
        {
            return Ok(Plan::short_circuit(
                &intent.intent_type,
                intent.confidence,
                intent.keywords.clone(),
            ));
        }

        let spec = self
            .config
            .intent(&intent.intent_type)
            .ok_or_else(|| Error::Plan(format!("unknown intent: {}", intent.intent_type)))?;

        let mut teams = Vec::new();
        for agent in &spec.suggested_agents {
            let team = Team::parse(agent)
                .ok_or_else(|| Error::Plan(format!("plan references unknown team: {agent}")))?;
            if !teams.contains(&team) {
                teams.push(team);
            }
        }

        if teams.is_empty() {
            return Ok(Plan::short_circuit(
                &intent.intent_type,
                intent.confidence,
                intent.keywords.clone(),
            ));
        }

        // Dependency policy: search before analysis before document.
        teams.sort_by_key(|t| t.rank());

        let strategy = spec
            .execution_strategy
            .unwrap_or_else(|| infer_strategy(&teams));
        // Document review cannot run inside a parallel group; the HITL
        // pause needs a deterministic resume point.
        let strategy = if teams.contains(&Team::Document) && strategy == ExecutionStrategy::Parallel
        {
            ExecutionStrategy::Sequential
        } else {
            strategy
        };

        let steps: Vec<ExecutionStep> = teams
            .iter()
            .enumerate()
            .map(|(idx, team)| {
                let task = spec
                    .task_labels
                    .get(team.as_str())
                    .cloned()
                    .unwrap_or_else(|| format!("{} {}", spec.display_name, team.as_str()));
                let description = if sub_queries.is_empty() {
                    format!("{task} for the query")
                } else {
                    format!("{task} ({} sub-queries)", sub_queries.len())
                };
                ExecutionStep::new(format!("step_{idx}"), *team, task, description)
            })
            .collect();

        let parallel_groups = if strategy == ExecutionStrategy::Parallel {
            vec![teams.clone()]
        } else {
            Vec::new()
        };

        Ok(Plan {
            intent_type: intent.intent_type.clone(),
            confidence: intent.confidence,
            keywords: intent.keywords.clone(),
            estimated_total_time_s: self.config.planner.team_estimate_s * steps.len() as u32,
            execution_steps: steps,
            execution_strategy: strategy,
            parallel_groups,
        })
    }
}

/// Parallel only when no team consumes another's output.
fn infer_strategy(teams: &[Team]) -> ExecutionStrategy {
    let dependent = teams.len() > 1
        && (teams.contains(&Team::Analysis) || teams.contains(&Team::Document));
    if teams.len() > 1 && !dependent {
        ExecutionStrategy::Parallel
    } else {
        ExecutionStrategy::Sequential
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipsa_domain::config::{IntentSpec, PromptsConfig};
    use zipsa_llm::MockLlm;

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

    fn planner_with(config: Config, mock: &MockLlm) -> Planner {
        let prompts = Arc::new(
            PromptStore::load(&PromptsConfig {
                path: "/nonexistent".into(),
                hot_reload: false,
            })
            .unwrap(),
        );
        prompts.register("intent_analysis", "{query}\n{intents}\n{memory}");
        prompts.register("query_decomposition", "{query}\n{intent}");
        Planner::new(
            Arc::new(LlmGateway::new(
                Arc::new(mock.clone()),
                config.llm.clone(),
            )),
            prompts,
            Arc::new(config),
        )
    }

    fn base_config() -> Config {
        let mut config = Config::default();
        config.intents = vec![
            intent_spec("legal_consult", &["search"]),
            intent_spec("comprehensive", &["search", "analysis"]),
            intent_spec("document_creation", &["search", "document"]),
            intent_spec("irrelevant", &[]),
            intent_spec("unclear", &[]),
        ];
        config
    }

    fn result(intent: &str, confidence: f64) -> IntentResult {
        IntentResult {
            intent_type: intent.into(),
            confidence,
            keywords: vec!["전세".into()],
            entities: vec![],
        }
    }

    #[test]
    fn short_circuit_intent_yields_empty_plan() {
        let planner = planner_with(base_config(), &MockLlm::new());
        let plan = planner.create_plan(&result("irrelevant", 0.9), &[]).unwrap();
        assert!(plan.execution_steps.is_empty());
        assert_eq!(plan.intent_type, "irrelevant");
    }

    #[test]
    fn plan_orders_teams_by_dependency() {
        let mut config = base_config();
        // Config lists document before search; the plan must reorder.
        config.intents.push(intent_spec("reversed", &["document", "search"]));
        let planner = planner_with(config, &MockLlm::new());

        let plan = planner.create_plan(&result("reversed", 0.9), &[]).unwrap();
        let teams: Vec<Team> = plan.execution_steps.iter().map(|s| s.team).collect();
        assert_eq!(teams, vec![Team::Search, Team::Document]);
        assert_eq!(plan.execution_strategy, ExecutionStrategy::Sequential);
    }

    #[test]
    fn dependent_teams_get_sequential_strategy() {
        let planner = planner_with(base_config(), &MockLlm::new());
        let plan = planner
            .create_plan(&result("comprehensive", 0.8), &[])
            .unwrap();
        assert_eq!(plan.execution_strategy, ExecutionStrategy::Sequential);
        assert_eq!(plan.execution_steps.len(), 2);
        assert_eq!(plan.execution_steps[0].team, Team::Search);
        assert_eq!(plan.execution_steps[1].team, Team::Analysis);
    }

    #[test]
    fn strategy_override_is_honored_except_for_document() {
        let mut config = base_config();
        let mut spec = intent_spec("doc_parallel", &["search", "document"]);
        spec.execution_strategy = Some(ExecutionStrategy::Parallel);
        config.intents.push(spec);
        let planner = planner_with(config, &MockLlm::new());

        let plan = planner.create_plan(&result("doc_parallel", 0.9), &[]).unwrap();
        // Document forces sequential even when config says parallel.
        assert_eq!(plan.execution_strategy, ExecutionStrategy::Sequential);
    }

    #[test]
    fn pipeline_override_is_honored() {
        let mut config = base_config();
        let mut spec = intent_spec("piped", &["search", "analysis"]);
        spec.execution_strategy = Some(ExecutionStrategy::Pipeline);
        config.intents.push(spec);
        let planner = planner_with(config, &MockLlm::new());

        let plan = planner.create_plan(&result("piped", 0.9), &[]).unwrap();
        assert_eq!(plan.execution_strategy, ExecutionStrategy::Pipeline);
    }

    #[test]
    fn unknown_intent_is_a_plan_error() {
        let planner = planner_with(base_config(), &MockLlm::new());
        let err = planner.create_plan(&result("ghost", 0.9), &[]).unwrap_err();
        assert!(matches!(err, Error::Plan(_)));
    }

    #[test]
    fn estimated_time_scales_with_steps() {
        let planner = planner_with(base_config(), &MockLlm::new());
        let plan = planner
            .create_plan(&result("comprehensive", 0.8), &[])
            .unwrap();
        assert_eq!(plan.estimated_total_time_s, 30);
    }

    #[tokio::test]
    async fn analyze_intent_reclassifies_low_confidence() {
        let mock = MockLlm::new();
        mock.push_json(serde_json::json!({
            "intent_type": "legal_consult",
            "confidence": 0.3,
            "keywords": ["전세"],
            "entities": []
        }));
        let planner = planner_with(base_config(), &mock);

        let result = planner.analyze_intent("전세금?", "").await.unwrap();
        assert_eq!(result.intent_type, "unclear");
    }

    #[tokio::test]
    async fn analyze_intent_reclassifies_unknown_vocabulary() {
        let mock = MockLlm::new();
        mock.push_json(serde_json::json!({
            "intent_type": "weather_forecast",
            "confidence": 0.95,
        }));
        let planner = planner_with(base_config(), &mock);

        let result = planner.analyze_intent("날씨?", "").await.unwrap();
        assert_eq!(result.intent_type, "unclear");
    }

    #[tokio::test]
    async fn analyze_intent_accepts_confident_known_intent() {
        let mock = MockLlm::new();
        mock.push_json(serde_json::json!({
            "intent_type": "legal_consult",
            "confidence": 0.92,
            "keywords": ["전세금", "인상"],
            "entities": ["전세금"]
        }));
        let planner = planner_with(base_config(), &mock);

        let result = planner.analyze_intent("전세금 인상 한도는?", "").await.unwrap();
        assert_eq!(result.intent_type, "legal_consult");
        assert_eq!(result.keywords.len(), 2);
    }

    #[tokio::test]
    async fn decompose_skips_non_comprehensive_intents() {
        let planner = planner_with(base_config(), &MockLlm::new());
        let subs = planner
            .decompose_query("q", &result("legal_consult", 0.9))
            .await
            .unwrap();
        assert!(subs.is_empty());
    }

    #[tokio::test]
    async fn decompose_parses_sub_queries() {
        let mock = MockLlm::new();
        mock.push_json(serde_json::json!({
            "sub_queries": ["전세 시세", "대출 한도"]
        }));
        let planner = planner_with(base_config(), &mock);
        let subs = planner
            .decompose_query("전세 시세와 대출 한도", &result("comprehensive", 0.9))
            .await
            .unwrap();
        assert_eq!(subs, vec!["전세 시세".to_string(), "대출 한도".to_string()]);
    }
}
