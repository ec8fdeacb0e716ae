//! Structured answer assembly.
//!
//! Real answers are prompt-driven: the `response_synthesis` JSON call
//! returns sections which are validated and normalized here. Guidance
//! answers (irrelevant / unclear intents) are template-driven and never
//! touch the LLM.

use std::sync::Arc;

use serde_json::Value;

use zipsa_domain::answer::{
    AnswerMetadata, AnswerSection, Priority, SectionContent, SectionKind, StructuredAnswer,
};
use zipsa_domain::error::{Error, Result};
use zipsa_domain::event::{FinalResponse, ResponseType};
use zipsa_llm::prompts::vars;
use zipsa_llm::{ChatMessage, LlmGateway, PromptStore};

/// Title of the lead section of every synthesized answer.
pub const LEAD_SECTION_TITLE: &str = "핵심 답변";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guidance (template-driven)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pre-canned guidance payload for short-circuit intents.
pub fn guidance_response(prompts: &PromptStore, intent_type: &str) -> FinalResponse {
    let template = format!("guidance_{intent_type}");
    let message = prompts
        .render(&template, &Default::default())
        .or_else(|_| prompts.render("guidance_default", &Default::default()))
        .unwrap_or_else(|_| default_guidance_text(intent_type));

    FinalResponse {
        response_type: ResponseType::Guidance,
        answer: None,
        message: Some(message),
        structured_data: None,
        data: None,
    }
}

fn default_guidance_text(intent_type: &str) -> String {
    match intent_type {
        "unclear" => "질문을 조금 더 구체적으로 말씀해 주시면 정확히 도와드릴 수 있어요. \
                      예: \"전세금 인상 한도는 얼마인가요?\""
            .into(),
        _ => "부동산 관련 질문을 도와드리는 상담 서비스입니다. \
              전세, 매매, 대출, 계약서 관련 질문을 해주세요."
            .into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Synthesis (prompt-driven)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Synthesize the final structured answer from the aggregated team
/// results via the `response_synthesis` JSON call.
pub async fn synthesize_answer(
    llm: &Arc<LlmGateway>,
    prompts: &Arc<PromptStore>,
    query: &str,
    intent_type: &str,
    confidence: f64,
    sources: Vec<String>,
    aggregated: &Value,
) -> Result<FinalResponse> {
    let prompt = prompts.render(
        "response_synthesis",
        &vars([
            ("query", query.to_string()),
            ("intent", intent_type.to_string()),
            ("results", serde_json::to_string(aggregated)?),
        ]),
    )?;

    let raw = llm
        .chat_json("response_synthesis", vec![ChatMessage::user(prompt)])
        .await?;

    let answer_text = raw
        .get("answer")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            Error::Other("response synthesis returned no answer field".into())
        })?;

    let mut sections = raw
        .get("sections")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(parse_section).collect::<Vec<_>>())
        .unwrap_or_default();

    // The lead section always exists and always comes first.
    if !sections
        .first()
        .is_some_and(|s| s.title == LEAD_SECTION_TITLE)
    {
        sections.insert(
            0,
            AnswerSection::text(LEAD_SECTION_TITLE, answer_text.clone())
                .with_priority(Priority::High),
        );
    }

    let structured = StructuredAnswer {
        sections,
        metadata: AnswerMetadata {
            confidence,
            sources,
            intent_type: intent_type.to_string(),
        },
    };

    Ok(FinalResponse {
        response_type: ResponseType::Answer,
        answer: Some(answer_text),
        message: None,
        structured_data: Some(structured),
        data: None,
    })
}

/// Parse one model-provided section, tolerating missing optionals.
fn parse_section(value: &Value) -> Option<AnswerSection> {
    let title = value.get("title")?.as_str()?.to_string();
    let content = match value.get("content")? {
        Value::String(s) => SectionContent::Text(s.clone()),
        Value::Array(items) => SectionContent::Items(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
        ),
        _ => return None,
    };

    let kind = match value.get("type").and_then(Value::as_str) {
        Some("checklist") => SectionKind::Checklist,
        Some("warning") => SectionKind::Warning,
        _ => SectionKind::Text,
    };
    let priority = match value.get("priority").and_then(Value::as_str) {
        Some("high") => Priority::High,
        Some("low") => Priority::Low,
        _ => Priority::Medium,
    };

    Some(AnswerSection {
        title,
        content,
        icon: value
            .get("icon")
            .and_then(Value::as_str)
            .map(str::to_owned),
        priority,
        expandable: value
            .get("expandable")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipsa_domain::config::{LlmConfig, PromptsConfig};
    use zipsa_llm::MockLlm;

    fn prompt_store() -> Arc<PromptStore> {
        let prompts = Arc::new(
            PromptStore::load(&PromptsConfig {
                path: "/nonexistent".into(),
                hot_reload: false,
            })
            .unwrap(),
        );
        prompts.register("response_synthesis", "{query}\n{intent}\n{results}");
        prompts
    }

    #[test]
    fn guidance_uses_template_when_present() {
        let prompts = prompt_store();
        prompts.register("guidance_irrelevant", "부동산 질문을 해주세요.");
        let resp = guidance_response(&prompts, "irrelevant");
        assert_eq!(resp.response_type, ResponseType::Guidance);
        assert_eq!(resp.message.as_deref(), Some("부동산 질문을 해주세요."));
        assert!(resp.structured_data.is_none());
    }

    #[test]
    fn guidance_falls_back_to_built_in_text() {
        let prompts = prompt_store();
        let resp = guidance_response(&prompts, "unclear");
        assert!(resp.message.unwrap().contains("구체적"));
    }

    #[tokio::test]
    async fn synthesize_preserves_model_sections() {
        let mock = MockLlm::new();
        mock.push_json(serde_json::json!({
            "answer": "전세금 인상 한도는 5%입니다.",
            "sections": [
                {"title": "핵심 답변", "content": "전세금 인상 한도는 5%입니다.", "priority": "high"},
                {"title": "체크리스트", "content": ["등기부등본 확인"], "type": "checklist"}
            ]
        }));
        let llm = Arc::new(LlmGateway::new(Arc::new(mock), LlmConfig::default()));

        let resp = synthesize_answer(
            &llm,
            &prompt_store(),
            "전세금 인상 한도는?",
            "legal_consult",
            0.9,
            vec!["search".into()],
            &serde_json::json!({"search": {}}),
        )
        .await
        .unwrap();

        let structured = resp.structured_data.unwrap();
        assert_eq!(structured.sections.len(), 2);
        assert_eq!(structured.sections[0].title, LEAD_SECTION_TITLE);
        assert_eq!(structured.sections[1].kind, SectionKind::Checklist);
        assert_eq!(structured.metadata.intent_type, "legal_consult");
    }

    #[tokio::test]
    async fn synthesize_inserts_missing_lead_section() {
        let mock = MockLlm::new();
        mock.push_json(serde_json::json!({
            "answer": "답변 본문",
            "sections": [
                {"title": "주의사항", "content": "확인 필요", "type": "warning"}
            ]
        }));
        let llm = Arc::new(LlmGateway::new(Arc::new(mock), LlmConfig::default()));

        let resp = synthesize_answer(
            &llm,
            &prompt_store(),
            "q",
            "legal_consult",
            0.8,
            vec![],
            &serde_json::json!({}),
        )
        .await
        .unwrap();

        let structured = resp.structured_data.unwrap();
        assert_eq!(structured.sections[0].title, LEAD_SECTION_TITLE);
        assert_eq!(structured.sections.len(), 2);
    }

    #[tokio::test]
    async fn synthesize_without_answer_field_errors() {
        let mock = MockLlm::new();
        mock.push_json(serde_json::json!({"sections": []}));
        let llm = Arc::new(LlmGateway::new(Arc::new(mock), LlmConfig::default()));

        let err = synthesize_answer(
            &llm,
            &prompt_store(),
            "q",
            "legal_consult",
            0.8,
            vec![],
            &serde_json::json!({}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no answer field"));
    }

    #[test]
    fn parse_section_rejects_malformed_content() {
        assert!(parse_section(&serde_json::json!({"title": "t", "content": 42})).is_none());
        assert!(parse_section(&serde_json::json!({"content": "no title"})).is_none());
    }
}
