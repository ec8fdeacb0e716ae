//! Document team: template selection with placeholder validation,
//! generation through the renderer tool, and the human-review branch.
//!
//! The review pause itself is owned by the supervisor; this executor
//! only decides *whether* the generated draft needs review and rebuilds
//! its inputs when a reviewer asks for changes.

use serde_json::{json, Value};

use zipsa_domain::error::{Error, Result};
use zipsa_domain::interrupt::InterruptRequest;
use zipsa_domain::plan::Team;
use zipsa_domain::team::TeamState;
use zipsa_tools::{InvokeRecord, ToolMetadata};

use super::{TeamContext, TeamExecutor};

pub struct DocumentTeam;

/// Template chosen from the query wording; defaults to the lease
/// contract, the dominant consultation flow.
fn select_template(query: &str) -> &'static str {
    let q = query.to_lowercase();
    if q.contains("매매") || q.contains("sales") {
        "sales_contract"
    } else {
        "lease_contract"
    }
}

#[async_trait::async_trait]
impl TeamExecutor for DocumentTeam {
    fn team(&self) -> Team {
        Team::Document
    }

    fn selection_task(&self) -> &'static str {
        "tool_selection_document"
    }

    /// Select the template and validate placeholder coverage before any
    /// tool runs — a template with unfillable slots fails the team early.
    async fn prepare(&self, ctx: &TeamContext, state: &mut TeamState) -> Result<()> {
        let template = select_template(&ctx.shared.query);
        if !ctx.app.prompts.contains(template) {
            return Err(Error::Other(format!(
                "document template {template} is not registered"
            )));
        }

        // Parameters from upstream teams plus reviewer feedback carried
        // across regenerations.
        let mut parameters = ctx
            .input_data
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| json!({}));
        if let Some(feedback) = ctx.input_data.get("feedback").and_then(Value::as_str) {
            parameters["reviewer_feedback"] = json!(feedback);
        }

        state.inputs = json!({
            "query": ctx.shared.query,
            "document_type": template,
            "template": template,
            "parameters": parameters,
            "pre_approved": ctx.input_data.get("pre_approved").and_then(Value::as_bool).unwrap_or(false),
        });
        Ok(())
    }

    fn tool_inputs(&self, state: &TeamState, _tool: &ToolMetadata) -> Value {
        json!({
            "template": state.inputs.get("template").cloned().unwrap_or(Value::Null),
            "parameters": state.inputs.get("parameters").cloned().unwrap_or(json!({})),
            "query": state.inputs.get("query").cloned().unwrap_or(Value::Null),
        })
    }

    fn merge_outcomes(&self, state: &mut TeamState, records: &[InvokeRecord]) {
        let document = records
            .iter()
            .filter(|r| r.outcome.is_success())
            .filter_map(|r| r.outcome.data.as_ref())
            .filter_map(|d| d.get("document").and_then(Value::as_str))
            .next_back()
            .unwrap_or("")
            .to_string();

        state.outputs = json!({
            "generated_document": document,
            "review_result": Value::Null,
            "final_document_markdown": "",
        });
    }

    async fn post_aggregate(&self, _ctx: &TeamContext, state: &mut TeamState) -> Result<()> {
        let markdown = state.outputs["generated_document"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if let Some(obj) = state.outputs.as_object_mut() {
            obj.insert("final_document_markdown".into(), json!(markdown));
        }
        Ok(())
    }

    /// The review gate: configured document types pause for approval
    /// unless the resume path marked the draft pre-approved.
    fn review_request(&self, ctx: &TeamContext, state: &TeamState) -> Option<InterruptRequest> {
        if state.inputs.get("pre_approved").and_then(Value::as_bool) == Some(true) {
            return None;
        }
        let document_type = state.inputs.get("document_type")?.as_str()?;
        if !ctx
            .app
            .config
            .teams
            .hitl_document_types
            .iter()
            .any(|t| t == document_type)
        {
            return None;
        }

        Some(InterruptRequest::document_review(
            json!({
                "document_type": document_type,
                "draft": state.outputs["generated_document"],
            }),
            "생성된 문서를 검토해 주세요. 승인, 수정 요청, 반려 중 선택할 수 있습니다.",
        ))
    }
}

/// Apply a reviewer decision to the team outputs on the resume path.
pub fn apply_review_result(state: &mut TeamState, action: &str, note: Option<&str>) {
    if let Some(obj) = state.outputs.as_object_mut() {
        obj.insert(
            "review_result".into(),
            json!({ "action": action, "note": note }),
        );
        if action == "reject" {
            obj.insert("generated_document".into(), json!(""));
            obj.insert("final_document_markdown".into(), json!(""));
        }
    }
}
