//! Persistence ports. One trait covers all relational access so handlers
//! depend on a single injected `Arc<dyn DataStore>`; PostgreSQL backs it in
//! production and an in-memory implementation backs the tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Chat, Claim, Document, Message, ProcessingStatus, Requirement, User};

/// A requirement entry ready for insertion.
#[derive(Debug, Clone)]
pub struct NewRequirement {
    pub text: String,
    pub category: Option<String>,
    pub priority: Option<String>,
}

#[async_trait]
pub trait DataStore: Send + Sync {
    // --- users ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn create_user(&self, username: &str, email: &str) -> Result<User>;

    // --- chats & messages ---
    async fn create_chat(&self, user_id: Uuid, title: &str) -> Result<Chat>;
    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>>;
    async fn list_chats(&self, user_id: Uuid) -> Result<Vec<Chat>>;
    async fn set_chat_title(&self, chat_id: Uuid, title: &str) -> Result<()>;
    async fn messages_for_chat(&self, chat_id: Uuid) -> Result<Vec<Message>>;
    /// Total characters across every message in the conversation.
    async fn conversation_chars(&self, chat_id: Uuid) -> Result<i64>;

    /// Persist the user/assistant message pair AND decrement one credit in
    /// a single transaction. Fails with `InsufficientCredits` (persisting
    /// nothing) when the balance is empty, so there is no separate
    /// decrement-then-refund window to leak credits through.
    async fn commit_exchange(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<(Message, Message)>;

    // --- documents ---
    /// Creates a document with status `pending`. Duplicate filenames per
    /// owner are rejected with `DuplicateDocument`.
    async fn create_document(
        &self,
        user_id: Uuid,
        filename: &str,
        content: &str,
        processing_type: &str,
    ) -> Result<Document>;
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;
    async fn list_documents(&self, user_id: Uuid) -> Result<Vec<Document>>;
    /// pending -> {completed | failed}; also attaches processed content.
    async fn set_document_result(
        &self,
        id: Uuid,
        processed_content: Option<Value>,
        status: ProcessingStatus,
    ) -> Result<()>;

    // --- requirements ---
    async fn insert_requirements(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        entries: &[NewRequirement],
    ) -> Result<Vec<Requirement>>;
    async fn delete_requirements_for_document(&self, document_id: Uuid) -> Result<()>;
    async fn requirements_for_document(&self, document_id: Uuid) -> Result<Vec<Requirement>>;

    // --- claims ---
    /// Persist the analyze outcome atomically: one claim row, one chat, one
    /// assistant message carrying the serialized analysis, and one credit
    /// decrement, all in a single transaction.
    async fn commit_analysis(
        &self,
        user_id: Uuid,
        requirements_document_id: Uuid,
        claim_document_id: Uuid,
        analysis_type: &str,
        analysis_result: &Value,
        chat_title: &str,
    ) -> Result<(Claim, Chat, Message)>;
    async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<Claim>>;
}
