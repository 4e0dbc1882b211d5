//! Prompt template registry. Analysis kinds map to a system prompt plus
//! the JSON field the iterative de-duplication step reads from prior
//! results. Templates are configuration, not logic: the expected response
//! shape is described in the prompt itself and the invoker only checks
//! that the reply is valid JSON.

use serde::Serialize;

use crate::error::{AppError, Result};

/// Registered analysis kinds for the wizard's analyze step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Explain,
    Enhance,
    MockRejection,
    Grammar,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Explain => "explain",
            AnalysisKind::Enhance => "enhance",
            AnalysisKind::MockRejection => "mock_rejection",
            AnalysisKind::Grammar => "grammar",
        }
    }

    /// Parse a client-supplied analysis type, accepting the aliases the
    /// product has accumulated over time.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explain" | "critique" => Ok(AnalysisKind::Explain),
            "enhance" => Ok(AnalysisKind::Enhance),
            "formalize" | "mock_rejection" | "rejection" => Ok(AnalysisKind::MockRejection),
            "grammar" | "language" => Ok(AnalysisKind::Grammar),
            other => Err(AppError::Validation(format!(
                "unknown analysis type '{other}' (supported: explain, enhance, mock_rejection, grammar)"
            ))),
        }
    }

    pub fn template(&self) -> &'static PromptTemplate {
        match self {
            AnalysisKind::Explain => &EXPLAIN_TEMPLATE,
            AnalysisKind::Enhance => &ENHANCE_TEMPLATE,
            AnalysisKind::MockRejection => &MOCK_REJECTION_TEMPLATE,
            AnalysisKind::Grammar => &GRAMMAR_TEMPLATE,
        }
    }
}

pub struct PromptTemplate {
    pub system: &'static str,
    /// Field of prior analysis JSON holding the items the de-duplication
    /// instruction references.
    pub prior_items_path: &'static str,
}

static EXPLAIN_TEMPLATE: PromptTemplate = PromptTemplate {
    system: r#"You are an insurance claims analyst helping disaster survivors.
You are given a REQUIREMENTS document (policy or program rules) and a CLAIM document.

Explain how the claim measures up against each requirement, in plain language.

Respond with ONLY this JSON shape:
{
  "analysis": "<overall plain-language assessment>",
  "recommendations": [
    {"number": 1, "title": "<short title>", "detail": "<what to do and why>"}
  ]
}
Number recommendations contiguously starting at 1. Do not mix prose and JSON."#,
    prior_items_path: "recommendations",
};

static ENHANCE_TEMPLATE: PromptTemplate = PromptTemplate {
    system: r#"You are an insurance claims coach for disaster survivors.
You are given a REQUIREMENTS document and a CLAIM document.

Suggest concrete improvements that would strengthen the claim: missing evidence,
unclear valuations, omitted covered items, and stronger wording.

Respond with ONLY this JSON shape:
{
  "analysis": "<summary of the claim's current strength>",
  "recommendations": [
    {"number": 1, "title": "<short title>", "detail": "<specific improvement>"}
  ]
}
Number recommendations contiguously starting at 1. Do not mix prose and JSON."#,
    prior_items_path: "recommendations",
};

static MOCK_REJECTION_TEMPLATE: PromptTemplate = PromptTemplate {
    system: r#"You are an adversarial insurance adjuster simulating a claim review.
You are given a REQUIREMENTS document and a CLAIM document.

Identify every plausible ground on which this claim could be rejected,
organized by priority (High, Medium, Low). Focus on coverage gaps, compliance
issues, and documentation problems. If the claim appears incomplete or unclear,
include that as a potential rejection reason.

Respond with ONLY this JSON shape:
{
  "analysis": "<overall rejection risk assessment>",
  "rejection_reasons": [
    {"number": 1, "priority": "High", "reason": "<ground for rejection>", "remedy": "<how to pre-empt it>"}
  ]
}
Number reasons contiguously starting at 1. Do not mix prose and JSON."#,
    prior_items_path: "rejection_reasons",
};

static GRAMMAR_TEMPLATE: PromptTemplate = PromptTemplate {
    system: r#"You are a professional editor reviewing an insurance claim for clarity.
You are given a REQUIREMENTS document for context and a CLAIM document to edit.

Point out grammar, wording, and structure problems that weaken the claim,
with corrected phrasing for each.

Respond with ONLY this JSON shape:
{
  "analysis": "<overall language assessment>",
  "recommendations": [
    {"number": 1, "title": "<short title>", "detail": "<problem and corrected phrasing>"}
  ]
}
Number recommendations contiguously starting at 1. Do not mix prose and JSON."#,
    prior_items_path: "recommendations",
};

/// Extracts structured requirement rows from a requirements document at
/// upload time (wizard step 1).
pub const REQUIREMENTS_EXTRACTION_PROMPT: &str = r#"You are a document analyst.
Extract every distinct obligation, condition, or requirement from the document below.

Respond with ONLY this JSON shape:
{
  "requirements": [
    {"text": "<the requirement>", "category": "<short category>", "priority": "high|medium|low"}
  ]
}
Do not mix prose and JSON."#;

/// Stand-alone rejection simulation (outside the wizard): exactly 25
/// prioritized rejection reasons. The fixed count is enforced only by this
/// prompt text, not validated server-side.
pub const REJECTION_SIMULATION_PROMPT: &str = r#"You are an expert insurance analyst.
Analyze the provided insurance document and generate exactly 25 potential reasons
for rejection, organized by priority (High, Medium, Low). Focus on coverage gaps,
compliance issues, and documentation problems. If the document appears to be
incomplete or unclear, include that as a potential rejection reason.

Respond with ONLY this JSON shape:
{
  "rejection_reasons": [
    {"number": 1, "priority": "High", "reason": "<ground for rejection>"}
  ]
}
Number reasons 1 through 25. Do not mix prose and JSON."#;

/// System prompt for the resource-finder chat.
pub const RESOURCE_FINDER_PROMPT: &str = r#"You are a helpful resource finder for emergency preparedness and disaster response.
Your goal is to help users find relevant resources, information, and assistance for emergency situations.
Focus on providing actionable information and reliable resources. Be concise and clear in your responses."#;

/// System prompt for the general assistant chat.
pub const CHAT_SYSTEM_PROMPT: &str = r#"You are a disaster-relief support assistant.
You help users navigate insurance claims, FEMA assistance forms, and recovery resources.
Be practical, accurate, and compassionate. When you are unsure, say so."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_accepts_observed_aliases() {
        assert_eq!(AnalysisKind::parse("explain").unwrap(), AnalysisKind::Explain);
        assert_eq!(AnalysisKind::parse("critique").unwrap(), AnalysisKind::Explain);
        assert_eq!(AnalysisKind::parse("ENHANCE").unwrap(), AnalysisKind::Enhance);
        assert_eq!(
            AnalysisKind::parse("formalize").unwrap(),
            AnalysisKind::MockRejection
        );
        assert_eq!(AnalysisKind::parse("language").unwrap(), AnalysisKind::Grammar);
    }

    #[test]
    fn unregistered_kind_is_a_validation_error() {
        let err = AnalysisKind::parse("summarize").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejection_template_reads_rejection_reasons() {
        assert_eq!(
            AnalysisKind::MockRejection.template().prior_items_path,
            "rejection_reasons"
        );
    }
}
