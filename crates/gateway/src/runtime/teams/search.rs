//! Search team: keyword extraction, four-domain vector search, and the
//! four-slot output the downstream teams consume.

use serde_json::{json, Value};

use zipsa_domain::error::Result;
use zipsa_domain::plan::Team;
use zipsa_domain::team::TeamState;
use zipsa_llm::prompts::vars;
use zipsa_llm::ChatMessage;
use zipsa_tools::{InvokeRecord, ToolMetadata};

use super::{TeamContext, TeamExecutor};

/// The conventional slot names of the search output.
const SLOTS: [&str; 4] = [
    "legal_search",
    "real_estate_search",
    "property_search",
    "loan_search",
];

pub struct SearchTeam;

#[async_trait::async_trait]
impl TeamExecutor for SearchTeam {
    fn team(&self) -> Team {
        Team::Search
    }

    fn selection_task(&self) -> &'static str {
        "tool_selection_search"
    }

    /// Extract a structured keyword bundle. A failed extraction degrades
    /// to the raw query — search still runs.
    async fn prepare(&self, ctx: &TeamContext, state: &mut TeamState) -> Result<()> {
        let keywords = match ctx.app.prompts.render(
            "keyword_extraction",
            &vars([("query", ctx.shared.query.clone())]),
        ) {
            Ok(prompt) => {
                match ctx
                    .app
                    .llm
                    .chat_json("keyword_extraction", vec![ChatMessage::user(prompt)])
                    .await
                {
                    Ok(raw) => raw.get("keywords").cloned().unwrap_or(Value::Null),
                    Err(e) => {
                        tracing::warn!(error = %e, "keyword extraction failed; using raw query");
                        Value::Null
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "keyword extraction prompt unavailable");
                Value::Null
            }
        };

        state.inputs = json!({
            "query": ctx.shared.query,
            "keywords": keywords,
            "language": ctx.shared.language,
        });
        Ok(())
    }

    fn tool_inputs(&self, state: &TeamState, tool: &ToolMetadata) -> Value {
        json!({
            "query": state.inputs.get("query").cloned().unwrap_or(Value::Null),
            "keywords": state
                .inputs
                .get("keywords")
                .and_then(|k| k.get(&tool.name))
                .or_else(|| state.inputs.get("keywords"))
                .cloned()
                .unwrap_or(Value::Null),
        })
    }

    /// Four-slot merge keyed by tool name — commutative by construction.
    fn merge_outcomes(&self, state: &mut TeamState, records: &[InvokeRecord]) {
        let mut outputs = serde_json::Map::new();
        for slot in SLOTS {
            let value = records
                .iter()
                .find(|r| r.tool == slot)
                .map(|r| match (&r.outcome.data, &r.outcome.error) {
                    (Some(data), _) => data.clone(),
                    (None, Some(error)) => json!({ "status": "error", "error": error }),
                    (None, None) => Value::Null,
                })
                .unwrap_or(Value::Null);
            outputs.insert(slot.to_string(), value);
        }
        state.outputs = Value::Object(outputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipsa_domain::team::{OutcomeStatus, SharedContext, ToolOutcome};

    fn record(tool: &str, outcome: ToolOutcome) -> InvokeRecord {
        InvokeRecord {
            tool: tool.into(),
            outcome,
            latency_ms: 5,
        }
    }

    fn state() -> TeamState {
        TeamState::new(
            Team::Search,
            SharedContext::new("전세금?", "s1", None, "ko"),
            Value::Null,
        )
    }

    #[test]
    fn merge_fills_all_four_slots() {
        let mut st = state();
        let records = vec![
            record("legal_search", ToolOutcome::success(json!({"results": [1]}))),
            record("loan_search", ToolOutcome::error("upstream down")),
        ];
        SearchTeam.merge_outcomes(&mut st, &records);

        assert_eq!(st.outputs["legal_search"]["results"][0], 1);
        assert_eq!(st.outputs["loan_search"]["status"], "error");
        assert!(st.outputs["real_estate_search"].is_null());
        assert!(st.outputs["property_search"].is_null());
    }

    #[test]
    fn merge_is_commutative() {
        let records = vec![
            record("legal_search", ToolOutcome::success(json!({"a": 1}))),
            record("property_search", ToolOutcome::success(json!({"b": 2}))),
        ];
        let mut forward = state();
        SearchTeam.merge_outcomes(&mut forward, &records);

        let reversed: Vec<InvokeRecord> = records.into_iter().rev().collect();
        let mut backward = state();
        SearchTeam.merge_outcomes(&mut backward, &reversed);

        assert_eq!(forward.outputs, backward.outputs);
    }

    #[test]
    fn tool_inputs_pick_per_tool_keywords() {
        let mut st = state();
        st.inputs = json!({
            "query": "전세금?",
            "keywords": { "legal_search": ["전세금", "인상"] }
        });
        let meta = ToolMetadata {
            name: "legal_search".into(),
            description: "".into(),
            tags: vec!["search".into()],
            input_schema: json!({}),
            reuse_eligible: true,
        };
        let inputs = SearchTeam.tool_inputs(&st, &meta);
        assert_eq!(inputs["keywords"][0], "전세금");
        assert_eq!(inputs["query"], "전세금?");
    }

    #[test]
    fn outcome_status_serializes_for_slot_errors() {
        // Guard: the error slot shape the analysis team reads.
        let out = ToolOutcome::error("x");
        assert_eq!(out.status, OutcomeStatus::Error);
    }
}
