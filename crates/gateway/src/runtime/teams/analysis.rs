//! Analysis team: analysis-type routing, tool fan-out over market and
//! contract analyzers, and LLM-driven insight generation on top of the
//! raw results.

use serde_json::{json, Value};

use zipsa_domain::error::Result;
use zipsa_domain::plan::Team;
use zipsa_domain::team::TeamState;
use zipsa_llm::prompts::vars;
use zipsa_llm::ChatMessage;
use zipsa_tools::{InvokeRecord, ToolMetadata};

use super::{TeamContext, TeamExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    Comprehensive,
    Market,
    Risk,
    Contract,
    Custom,
}

impl AnalysisType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::Market => "market",
            Self::Risk => "risk",
            Self::Contract => "contract",
            Self::Custom => "custom",
        }
    }

    /// Route on query wording; upstream search results refine nothing
    /// here — they flow into the tools as context.
    fn from_query(query: &str) -> Self {
        let q = query.to_lowercase();
        if q.contains("시세") || q.contains("market") || q.contains("가격") {
            Self::Market
        } else if q.contains("위험") || q.contains("risk") {
            Self::Risk
        } else if q.contains("계약") || q.contains("contract") {
            Self::Contract
        } else {
            Self::Comprehensive
        }
    }
}

pub struct AnalysisTeam;

#[async_trait::async_trait]
impl TeamExecutor for AnalysisTeam {
    fn team(&self) -> Team {
        Team::Analysis
    }

    fn selection_task(&self) -> &'static str {
        "tool_selection_analysis"
    }

    async fn prepare(&self, ctx: &TeamContext, state: &mut TeamState) -> Result<()> {
        let analysis_type = AnalysisType::from_query(&ctx.shared.query);
        state.inputs = json!({
            "query": ctx.shared.query,
            "analysis_type": analysis_type.as_str(),
            "search_results": ctx.input_data.get("search_results").cloned().unwrap_or(Value::Null),
        });
        Ok(())
    }

    fn tool_inputs(&self, state: &TeamState, _tool: &ToolMetadata) -> Value {
        json!({
            "query": state.inputs.get("query").cloned().unwrap_or(Value::Null),
            "analysis_type": state.inputs.get("analysis_type").cloned().unwrap_or(Value::Null),
            "search_results": state.inputs.get("search_results").cloned().unwrap_or(Value::Null),
            "region": extract_region(state.inputs.get("query").and_then(Value::as_str).unwrap_or("")),
        })
    }

    /// Raw results keyed by tool name — commutative.
    fn merge_outcomes(&self, state: &mut TeamState, records: &[InvokeRecord]) {
        let mut raw = serde_json::Map::new();
        for record in records {
            let value = match (&record.outcome.data, &record.outcome.error) {
                (Some(data), _) => data.clone(),
                (None, Some(error)) => json!({ "status": "error", "error": error }),
                (None, None) => Value::Null,
            };
            raw.insert(record.tool.clone(), value);
        }
        state.outputs = json!({
            "raw_analysis": Value::Object(raw),
            "insights": [],
            "report": "",
            "confidence_score": 0.0,
        });
    }

    /// Insight generation over the merged raw analysis. A failure leaves
    /// the raw results intact and degrades the enrichment only.
    async fn post_aggregate(&self, ctx: &TeamContext, state: &mut TeamState) -> Result<()> {
        let prompt = ctx.app.prompts.render(
            "insight_generation",
            &vars([
                ("query", ctx.shared.query.clone()),
                (
                    "analysis",
                    serde_json::to_string(&state.outputs["raw_analysis"])?,
                ),
                (
                    "search_results",
                    serde_json::to_string(&state.inputs["search_results"])?,
                ),
            ]),
        )?;

        let raw = ctx
            .app
            .llm
            .chat_json("insight_generation", vec![ChatMessage::user(prompt)])
            .await?;

        if let Some(obj) = state.outputs.as_object_mut() {
            obj.insert(
                "insights".into(),
                raw.get("insights").cloned().unwrap_or_else(|| json!([])),
            );
            obj.insert(
                "report".into(),
                raw.get("report").cloned().unwrap_or_else(|| json!("")),
            );
            obj.insert(
                "confidence_score".into(),
                raw.get("confidence").cloned().unwrap_or_else(|| json!(0.5)),
            );
        }
        Ok(())
    }
}

/// Best-effort region pick for the market-data tool.
fn extract_region(query: &str) -> Value {
    for region in ["강남구", "마포구", "서초구", "송파구"] {
        if query.contains(region) {
            return json!(region);
        }
    }
    Value::Null
}
