//! Analysis invoker: builds a prompt from a template, folds in prior
//! conversation context, sends a single completion request, and parses the
//! JSON-shaped result.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::llm::ChatModel;
use crate::prompts::{AnalysisKind, REQUIREMENTS_EXTRACTION_PROMPT};

pub struct AnalysisInvoker {
    model: Arc<dyn ChatModel>,
}

/// A requirement entry parsed out of a requirements document.
#[derive(Debug, serde::Deserialize)]
pub struct ParsedRequirement {
    pub text: String,
    pub category: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct RequirementsEnvelope {
    requirements: Vec<ParsedRequirement>,
}

impl AnalysisInvoker {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Run one analysis over the two wizard documents.
    ///
    /// `prior_messages` are assistant messages from an earlier analysis
    /// chat; items already surfaced there are extracted best-effort and
    /// the prompt asks for new, non-duplicate items numbered after them.
    pub async fn analyze(
        &self,
        kind: AnalysisKind,
        requirements_text: &str,
        claim_text: &str,
        prior_messages: &[String],
    ) -> Result<Value> {
        let template = kind.template();

        let mut prompt = format!(
            "REQUIREMENTS DOCUMENT:\n{requirements_text}\n\nCLAIM DOCUMENT:\n{claim_text}"
        );

        let covered = extract_prior_items(prior_messages, template.prior_items_path);
        if !covered.is_empty() {
            let next_number = covered.len() + 1;
            prompt.push_str(&format!(
                "\n\nThe following {} items were already covered in an earlier review:\n{}\n\
                 Produce only NEW items that do not repeat any of the above, \
                 numbered contiguously starting at {next_number}.",
                covered.len(),
                covered
                    .iter()
                    .map(|t| format!("- {t}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ));
        }

        info!(
            analysis_type = kind.as_str(),
            prior_items = covered.len(),
            "invoking analysis"
        );

        let response = self
            .model
            .chat(template.system, vec![], &prompt)
            .await
            .map_err(AppError::from)?;

        parse_json_response(&response)
    }

    /// Parse structured requirement entries out of a requirements document.
    pub async fn extract_requirements(&self, document_text: &str) -> Result<Vec<ParsedRequirement>> {
        let response = self
            .model
            .chat(REQUIREMENTS_EXTRACTION_PROMPT, vec![], document_text)
            .await
            .map_err(AppError::from)?;

        let value = parse_json_response(&response)?;
        let envelope: RequirementsEnvelope = serde_json::from_value(value)
            .map_err(|_| AppError::MalformedResponse)?;
        Ok(envelope.requirements)
    }
}

/// Parse a model reply as JSON, with exactly one cleanup retry (stripping
/// newlines/carriage returns) before giving up.
pub fn parse_json_response(response: &str) -> Result<Value> {
    match serde_json::from_str(response.trim()) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            debug!(error = %first_err, "analysis response failed to parse, retrying after cleanup");
            let cleaned: String = response.chars().filter(|c| *c != '\n' && *c != '\r').collect();
            serde_json::from_str(cleaned.trim()).map_err(|e| {
                warn!(error = %e, "analysis response is not valid JSON");
                AppError::MalformedResponse
            })
        }
    }
}

/// Best-effort extraction of previously surfaced items from prior assistant
/// messages. Fails open by contract: any message that is not valid JSON, or
/// lacks the expected field, is silently skipped.
pub fn extract_prior_items(messages: &[String], items_path: &str) -> Vec<String> {
    let mut items = Vec::new();
    for message in messages {
        let Ok(value) = serde_json::from_str::<Value>(message) else {
            continue;
        };
        let Some(entries) = value.get(items_path).and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            let title = entry
                .get("title")
                .or_else(|| entry.get("reason"))
                .and_then(Value::as_str);
            if let Some(title) = title {
                items.push(title.to_string());
            }
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    #[test]
    fn parses_clean_json() {
        let value = parse_json_response(r#"{"analysis": "ok"}"#).unwrap();
        assert_eq!(value["analysis"], "ok");
    }

    #[test]
    fn cleanup_retry_strips_embedded_newlines() {
        // Raw newlines inside a JSON string are invalid; the single cleanup
        // pass removes them and the parse succeeds.
        let raw = "{\"analysis\": \"line one\nline two\"}";
        let value = parse_json_response(raw).unwrap();
        assert_eq!(value["analysis"], "line oneline two");
    }

    #[test]
    fn unparseable_response_is_malformed() {
        let err = parse_json_response("Sure! Here is the analysis you asked for").unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse));
    }

    #[test]
    fn prior_item_scraping_fails_open() {
        let messages = vec![
            "not json at all".to_string(),
            r#"{"recommendations": [{"number": 1, "title": "Add receipts"}]}"#.to_string(),
            r#"{"unrelated": true}"#.to_string(),
            r#"{"recommendations": [{"number": 2, "title": "List damaged items"}]}"#.to_string(),
        ];
        let items = extract_prior_items(&messages, "recommendations");
        assert_eq!(items, vec!["Add receipts", "List damaged items"]);
    }

    #[tokio::test]
    async fn dedup_instruction_is_appended_for_prior_context() {
        let model = std::sync::Arc::new(ScriptedModel::replying(r#"{"analysis": "done"}"#));
        let invoker = AnalysisInvoker::new(model.clone());

        let prior = vec![r#"{"recommendations": [{"title": "Add receipts"}]}"#.to_string()];
        invoker
            .analyze(AnalysisKind::Explain, "reqs", "claim", &prior)
            .await
            .unwrap();

        let sent = model.calls.lock().unwrap()[0].clone();
        assert!(sent.contains("Add receipts"));
        assert!(sent.contains("numbered contiguously starting at 2"));
    }

    #[tokio::test]
    async fn requirement_extraction_parses_envelope() {
        let model = std::sync::Arc::new(ScriptedModel::replying(
            r#"{"requirements": [{"text": "Proof of residence", "category": "documentation", "priority": "high"}]}"#,
        ));
        let invoker = AnalysisInvoker::new(model);

        let reqs = invoker.extract_requirements("policy text").await.unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].text, "Proof of residence");
        assert_eq!(reqs[0].priority.as_deref(), Some("high"));
    }
}
