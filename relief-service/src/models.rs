use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of an uploaded document: starts `Pending`, ends in exactly
/// one of `Completed` or `Failed`. Failed documents stay queryable for
/// audit but cannot be bound into a wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "completed" => Some(ProcessingStatus::Completed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub credits: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub content: String,
    pub processing_type: String,
    pub processing_status: ProcessingStatus,
    pub processed_content: Option<Value>,
    pub uploaded_at: DateTime<Utc>,
}

/// One obligation/clause extracted from a requirements document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub requirement_text: String,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Linkage between the two wizard input documents, the analysis type,
/// and the structured result. Created once per analyze invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub user_id: Uuid,
    pub requirements_document_id: Uuid,
    pub claim_document_id: Uuid,
    pub analysis_type: String,
    pub analysis_result: Option<Value>,
    pub status: String,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    /// Human-facing reference tag attached to every claim record.
    pub fn new_reference() -> String {
        format!("CLM-{:08X}", rand::random::<u32>())
    }
}

// --- Request/response DTOs -------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NewChatRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub user_message: Message,
    pub assistant_message: Message,
}

#[derive(Debug, Deserialize)]
pub struct ReuseDocumentRequest {
    pub reuse_document_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
    pub filename: String,
    /// Wizard step after the upload; absent for non-wizard uploads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub analysis_type: String,
    pub previous_chat_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub chat_id: Uuid,
    pub analysis_result: Value,
}

#[derive(Debug, Serialize)]
pub struct WizardStateResponse {
    pub step: u8,
    pub requirements_doc_id: Option<Uuid>,
    pub claim_doc_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ResourceChatResponse {
    pub response: String,
}
