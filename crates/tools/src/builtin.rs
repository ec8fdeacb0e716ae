//! Reference tools for the real-estate consultation domain.
//!
//! Tool business logic lives outside the core; these implementations are
//! deliberately thin — enough to exercise the contract end-to-end. The
//! search tools rank a seeded corpus by embedding similarity, the
//! analysis tools call the LLM gateway, and the document renderer fills
//! a named template.

use std::sync::Arc;

use serde_json::{json, Value};

use zipsa_domain::error::{Error, Result};
use zipsa_domain::team::ToolOutcome;
use zipsa_llm::prompts::vars;
use zipsa_llm::{ChatMessage, LlmGateway, PromptStore};

use crate::{Tool, ToolMetadata, ToolRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Vector search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Embedding-ranked lookup over a seeded document corpus. One instance
/// per search domain (legal, real-estate knowledge, property listings,
/// loan products).
pub struct VectorSearchTool {
    meta: ToolMetadata,
    llm: Arc<LlmGateway>,
    corpus: Vec<String>,
    top_k: usize,
}

impl VectorSearchTool {
    pub fn new(
        name: &str,
        description: &str,
        llm: Arc<LlmGateway>,
        corpus: Vec<String>,
    ) -> Self {
        Self {
            meta: ToolMetadata {
                name: name.into(),
                description: description.into(),
                tags: vec!["search".into()],
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Search query" },
                        "keywords": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["query"]
                }),
                reuse_eligible: true,
            },
            llm,
            corpus,
            top_k: 3,
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait::async_trait]
impl Tool for VectorSearchTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.meta
    }

    async fn execute(&self, inputs: &Value) -> Result<ToolOutcome> {
        let query = inputs
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Tool {
                tool: self.meta.name.clone(),
                message: "missing required input: query".into(),
            })?;

        if self.corpus.is_empty() {
            return Ok(ToolOutcome::success(json!({ "results": [] })));
        }

        let mut texts: Vec<String> = vec![query.to_string()];
        texts.extend(self.corpus.iter().cloned());
        let embeddings = self.llm.embed(texts).await?;
        let (query_vec, doc_vecs) = embeddings.split_first().ok_or_else(|| Error::Tool {
            tool: self.meta.name.clone(),
            message: "embedding response was empty".into(),
        })?;

        let mut scored: Vec<(f32, &String)> = doc_vecs
            .iter()
            .zip(&self.corpus)
            .map(|(vec, doc)| (cosine(query_vec, vec), doc))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<Value> = scored
            .into_iter()
            .take(self.top_k)
            .map(|(score, doc)| json!({ "content": doc, "score": score }))
            .collect();

        Ok(ToolOutcome::success(json!({ "results": results })))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analysis tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Market statistics lookup over a seeded dataset.
pub struct MarketDataTool {
    meta: ToolMetadata,
    dataset: Value,
}

impl MarketDataTool {
    pub fn new(dataset: Value) -> Self {
        Self {
            meta: ToolMetadata {
                name: "market_data".into(),
                description: "Query regional price and volume statistics for the housing market."
                    .into(),
                tags: vec!["analysis".into()],
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "region": { "type": "string", "description": "Region name" }
                    }
                }),
                reuse_eligible: true,
            },
            dataset,
        }
    }
}

#[async_trait::async_trait]
impl Tool for MarketDataTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.meta
    }

    async fn execute(&self, inputs: &Value) -> Result<ToolOutcome> {
        let region = inputs.get("region").and_then(Value::as_str);
        let rows = match (region, self.dataset.as_object()) {
            (Some(region), Some(map)) => map
                .get(region)
                .cloned()
                .map(|v| json!({ region: v }))
                .unwrap_or_else(|| json!({})),
            _ => self.dataset.clone(),
        };
        Ok(ToolOutcome::success(json!({ "market": rows })))
    }
}

/// LLM-backed contract clause review.
pub struct ContractAnalyzerTool {
    meta: ToolMetadata,
    llm: Arc<LlmGateway>,
    prompts: Arc<PromptStore>,
}

impl ContractAnalyzerTool {
    pub fn new(llm: Arc<LlmGateway>, prompts: Arc<PromptStore>) -> Self {
        Self {
            meta: ToolMetadata {
                name: "contract_analyzer".into(),
                description: "Review lease or sales contract terms for risky clauses.".into(),
                tags: vec!["analysis".into()],
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "contract_text": { "type": "string" }
                    },
                    "required": ["query"]
                }),
                reuse_eligible: false,
            },
            llm,
            prompts,
        }
    }
}

#[async_trait::async_trait]
impl Tool for ContractAnalyzerTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.meta
    }

    async fn execute(&self, inputs: &Value) -> Result<ToolOutcome> {
        let query = inputs
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let contract = inputs
            .get("contract_text")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let prompt = self.prompts.render(
            "contract_analysis",
            &vars([
                ("query", query.to_string()),
                ("contract", contract.to_string()),
            ]),
        )?;
        let analysis = self
            .llm
            .chat_json("insight_generation", vec![ChatMessage::user(prompt)])
            .await?;
        Ok(ToolOutcome::success(json!({ "analysis": analysis })))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Document renderer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fill a named document template with the provided parameters.
pub struct DocumentRendererTool {
    meta: ToolMetadata,
    prompts: Arc<PromptStore>,
}

impl DocumentRendererTool {
    pub fn new(prompts: Arc<PromptStore>) -> Self {
        Self {
            meta: ToolMetadata {
                name: "document_renderer".into(),
                description: "Render a document from a named template and parameters.".into(),
                tags: vec!["document".into()],
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "template": { "type": "string", "description": "Template name" },
                        "parameters": { "type": "object" }
                    },
                    "required": ["template"]
                }),
                reuse_eligible: false,
            },
            prompts,
        }
    }
}

#[async_trait::async_trait]
impl Tool for DocumentRendererTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.meta
    }

    async fn execute(&self, inputs: &Value) -> Result<ToolOutcome> {
        let template = inputs
            .get("template")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Tool {
                tool: self.meta.name.clone(),
                message: "missing required input: template".into(),
            })?;

        let mut slot_vars = std::collections::HashMap::new();
        let owned: Vec<(String, String)> = inputs
            .get("parameters")
            .and_then(Value::as_object)
            .map(|params| {
                params
                    .iter()
                    .map(|(k, v)| {
                        let rendered = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), rendered)
                    })
                    .collect()
            })
            .unwrap_or_default();
        for (k, v) in &owned {
            slot_vars.insert(k.as_str(), v.clone());
        }

        let rendered = self.prompts.render(template, &slot_vars)?;
        Ok(ToolOutcome::success(json!({
            "document": rendered,
            "template": template,
        })))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Register the full reference tool set.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    llm: Arc<LlmGateway>,
    prompts: Arc<PromptStore>,
) {
    registry.register(Arc::new(VectorSearchTool::new(
        "legal_search",
        "Search statutes, precedents, and tenancy-law guidance.",
        llm.clone(),
        vec![
            "주택임대차보호법상 전세금(차임) 증액 청구는 5%를 초과할 수 없다.".into(),
            "임대차 계약 갱신요구권은 1회에 한하여 행사할 수 있으며 2년 연장된다.".into(),
            "보증금 반환 지연 시 지연이자를 청구할 수 있다.".into(),
        ],
    )));
    registry.register(Arc::new(VectorSearchTool::new(
        "real_estate_search",
        "Search general real-estate knowledge and procedures.",
        llm.clone(),
        vec![
            "전세 계약 전 등기부등본으로 선순위 근저당을 확인해야 한다.".into(),
            "확정일자와 전입신고를 마치면 대항력과 우선변제권이 생긴다.".into(),
        ],
    )));
    registry.register(Arc::new(VectorSearchTool::new(
        "property_search",
        "Search property listings by region and conditions.",
        llm.clone(),
        vec![
            "강남구 아파트 전세 매물: 84㎡, 보증금 7억.".into(),
            "마포구 오피스텔 월세 매물: 보증금 1억, 월 90만원.".into(),
        ],
    )));
    registry.register(Arc::new(VectorSearchTool::new(
        "loan_search",
        "Search loan products and eligibility rules.",
        llm.clone(),
        vec![
            "버팀목 전세자금대출: 연소득 5천만원 이하, 금리 2.1~2.9%.".into(),
            "디딤돌 구입자금대출: 생애최초 주택구입자 우대.".into(),
        ],
    )));
    registry.register(Arc::new(MarketDataTool::new(json!({
        "강남구": { "avg_jeonse": "7.2억", "trend": "+1.4%" },
        "마포구": { "avg_jeonse": "4.1억", "trend": "+0.6%" },
    }))));
    registry.register(Arc::new(ContractAnalyzerTool::new(
        llm.clone(),
        prompts.clone(),
    )));
    registry.register(Arc::new(DocumentRendererTool::new(prompts)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipsa_domain::config::{LlmConfig, PromptsConfig};
    use zipsa_llm::MockLlm;

    fn gateway() -> Arc<LlmGateway> {
        Arc::new(LlmGateway::new(Arc::new(MockLlm::new()), LlmConfig::default()))
    }

    fn prompt_store() -> Arc<PromptStore> {
        Arc::new(
            PromptStore::load(&PromptsConfig {
                path: "/nonexistent".into(),
                hot_reload: false,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn vector_search_ranks_and_limits() {
        let tool = VectorSearchTool::new(
            "legal_search",
            "test",
            gateway(),
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
        );
        let out = tool
            .execute(&json!({"query": "전세금"}))
            .await
            .unwrap();
        assert!(out.is_success());
        let results = out.data.unwrap()["results"].as_array().unwrap().len();
        assert_eq!(results, 3);
    }

    #[tokio::test]
    async fn vector_search_requires_query() {
        let tool = VectorSearchTool::new("legal_search", "test", gateway(), vec!["a".into()]);
        assert!(tool.execute(&json!({})).await.is_err());
    }

    #[tokio::test]
    async fn market_data_filters_by_region() {
        let tool = MarketDataTool::new(json!({
            "강남구": { "avg": 7 },
            "마포구": { "avg": 4 },
        }));
        let out = tool.execute(&json!({"region": "강남구"})).await.unwrap();
        let market = out.data.unwrap()["market"].clone();
        assert!(market.get("강남구").is_some());
        assert!(market.get("마포구").is_none());
    }

    #[tokio::test]
    async fn document_renderer_fills_template() {
        let prompts = prompt_store();
        prompts.register("lease_contract", "임대인: {landlord}, 보증금: {deposit}");
        let tool = DocumentRendererTool::new(prompts);
        let out = tool
            .execute(&json!({
                "template": "lease_contract",
                "parameters": { "landlord": "홍길동", "deposit": "7억" }
            }))
            .await
            .unwrap();
        let doc = out.data.unwrap()["document"].as_str().unwrap().to_string();
        assert!(doc.contains("홍길동"));
        assert!(doc.contains("7억"));
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
