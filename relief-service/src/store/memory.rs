//! In-memory implementation of [`DataStore`], used by the test suite and
//! available as a storage fallback for local development.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    Chat, Claim, Document, Message, MessageRole, ProcessingStatus, Requirement, User,
};
use crate::store::{DataStore, NewRequirement};

#[derive(Default)]
pub struct InMemoryDataStore {
    users: DashMap<Uuid, User>,
    chats: DashMap<Uuid, Chat>,
    messages: DashMap<Uuid, Message>,
    documents: DashMap<Uuid, Document>,
    requirements: DashMap<Uuid, Requirement>,
    claims: DashMap<Uuid, Claim>,
    // Serializes credit-bearing commits so the guarded decrement and the
    // row inserts behave like one transaction.
    credit_lock: Mutex<()>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test convenience: seed a user with a given credit balance.
    pub fn seed_user(&self, credits: i32) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: format!("user-{}", &Uuid::new_v4().to_string()[..8]),
            email: format!("{}@example.org", Uuid::new_v4()),
            credits,
            created_at: Utc::now(),
        };
        self.users.insert(user.id, user.clone());
        user
    }

    fn try_debit_credit(&self, user_id: Uuid) -> Result<()> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or(AppError::NotFound("user"))?;
        if user.credits < 1 {
            return Err(AppError::InsufficientCredits);
        }
        user.credits -= 1;
        Ok(())
    }

    fn push_message(&self, chat_id: Uuid, role: MessageRole, content: &str) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            chat_id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages.insert(message.id, message.clone());
        message
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn create_user(&self, username: &str, email: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            credits: 50,
            created_at: Utc::now(),
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_chat(&self, user_id: Uuid, title: &str) -> Result<Chat> {
        let chat = Chat {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
        Ok(self.chats.get(&id).map(|c| c.clone()))
    }

    async fn list_chats(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let mut chats: Vec<Chat> = self
            .chats
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone())
            .collect();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chats)
    }

    async fn set_chat_title(&self, chat_id: Uuid, title: &str) -> Result<()> {
        if let Some(mut chat) = self.chats.get_mut(&chat_id) {
            chat.title = title.to_string();
        }
        Ok(())
    }

    async fn messages_for_chat(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.clone())
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn conversation_chars(&self, chat_id: Uuid) -> Result<i64> {
        // Characters, not bytes, matching the SQL LENGTH() on TEXT.
        Ok(self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.content.chars().count() as i64)
            .sum())
    }

    async fn commit_exchange(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<(Message, Message)> {
        let _guard = self.credit_lock.lock().unwrap();
        self.try_debit_credit(user_id)?;
        let user_msg = self.push_message(chat_id, MessageRole::User, user_content);
        let assistant_msg = self.push_message(chat_id, MessageRole::Assistant, assistant_content);
        Ok((user_msg, assistant_msg))
    }

    async fn create_document(
        &self,
        user_id: Uuid,
        filename: &str,
        content: &str,
        processing_type: &str,
    ) -> Result<Document> {
        let duplicate = self
            .documents
            .iter()
            .any(|d| d.user_id == user_id && d.filename == filename);
        if duplicate {
            return Err(AppError::DuplicateDocument(filename.to_string()));
        }

        let document = Document {
            id: Uuid::new_v4(),
            user_id,
            filename: filename.to_string(),
            content: content.to_string(),
            processing_type: processing_type.to_string(),
            processing_status: ProcessingStatus::Pending,
            processed_content: None,
            uploaded_at: Utc::now(),
        };
        self.documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.documents.get(&id).map(|d| d.clone()))
    }

    async fn list_documents(&self, user_id: Uuid) -> Result<Vec<Document>> {
        let mut documents: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| d.user_id == user_id)
            .map(|d| d.clone())
            .collect();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(documents)
    }

    async fn set_document_result(
        &self,
        id: Uuid,
        processed_content: Option<Value>,
        status: ProcessingStatus,
    ) -> Result<()> {
        let mut document = self
            .documents
            .get_mut(&id)
            .ok_or(AppError::NotFound("document"))?;
        document.processed_content = processed_content;
        document.processing_status = status;
        Ok(())
    }

    async fn insert_requirements(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        entries: &[NewRequirement],
    ) -> Result<Vec<Requirement>> {
        let mut created = Vec::with_capacity(entries.len());
        for entry in entries {
            let requirement = Requirement {
                id: Uuid::new_v4(),
                user_id,
                document_id,
                requirement_text: entry.text.clone(),
                category: entry.category.clone(),
                priority: entry.priority.clone(),
                created_at: Utc::now(),
            };
            self.requirements.insert(requirement.id, requirement.clone());
            created.push(requirement);
        }
        Ok(created)
    }

    async fn delete_requirements_for_document(&self, document_id: Uuid) -> Result<()> {
        self.requirements.retain(|_, r| r.document_id != document_id);
        Ok(())
    }

    async fn requirements_for_document(&self, document_id: Uuid) -> Result<Vec<Requirement>> {
        let mut requirements: Vec<Requirement> = self
            .requirements
            .iter()
            .filter(|r| r.document_id == document_id)
            .map(|r| r.clone())
            .collect();
        requirements.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(requirements)
    }

    async fn commit_analysis(
        &self,
        user_id: Uuid,
        requirements_document_id: Uuid,
        claim_document_id: Uuid,
        analysis_type: &str,
        analysis_result: &Value,
        chat_title: &str,
    ) -> Result<(Claim, Chat, Message)> {
        let _guard = self.credit_lock.lock().unwrap();
        self.try_debit_credit(user_id)?;

        let claim = Claim {
            id: Uuid::new_v4(),
            user_id,
            requirements_document_id,
            claim_document_id,
            analysis_type: analysis_type.to_string(),
            analysis_result: Some(analysis_result.clone()),
            status: "completed".to_string(),
            reference: Claim::new_reference(),
            created_at: Utc::now(),
        };
        self.claims.insert(claim.id, claim.clone());

        let chat = Chat {
            id: Uuid::new_v4(),
            user_id,
            title: chat_title.to_string(),
            created_at: Utc::now(),
        };
        self.chats.insert(chat.id, chat.clone());

        let serialized = serde_json::to_string(analysis_result)
            .map_err(|e| AppError::Processing(e.to_string()))?;
        let message = self.push_message(chat.id, MessageRole::Assistant, &serialized);

        Ok((claim, chat, message))
    }

    async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<Claim>> {
        let mut claims: Vec<Claim> = self
            .claims
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone())
            .collect();
        claims.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(claims)
    }
}
