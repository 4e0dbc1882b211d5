//! PostgreSQL implementation of [`DataStore`] using sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    Chat, Claim, Document, Message, MessageRole, ProcessingStatus, Requirement, User,
};
use crate::store::{DataStore, NewRequirement};

#[derive(Clone)]
pub struct PgDataStore {
    pool: PgPool,
}

impl PgDataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn map_unique_violation(e: sqlx::Error, filename: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::DuplicateDocument(filename.to_string())
        }
        _ => AppError::from(e),
    }
}

// --- row records -----------------------------------------------------------

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    credits: i32,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn into_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            credits: self.credits,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ChatRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
}

impl ChatRecord {
    fn into_domain(self) -> Chat {
        Chat {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    chat_id: Uuid,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl MessageRecord {
    fn into_domain(self) -> Result<Message> {
        let role = MessageRole::parse(&self.role)
            .ok_or_else(|| AppError::Database(format!("unknown message role '{}'", self.role)))?;
        Ok(Message {
            id: self.id,
            chat_id: self.chat_id,
            role,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    user_id: Uuid,
    filename: String,
    content: String,
    processing_type: String,
    processing_status: String,
    processed_content: Option<Value>,
    uploaded_at: DateTime<Utc>,
}

impl DocumentRecord {
    fn into_domain(self) -> Result<Document> {
        let processing_status = ProcessingStatus::parse(&self.processing_status).ok_or_else(|| {
            AppError::Database(format!(
                "unknown processing status '{}'",
                self.processing_status
            ))
        })?;
        Ok(Document {
            id: self.id,
            user_id: self.user_id,
            filename: self.filename,
            content: self.content,
            processing_type: self.processing_type,
            processing_status,
            processed_content: self.processed_content,
            uploaded_at: self.uploaded_at,
        })
    }
}

#[derive(FromRow)]
struct RequirementRecord {
    id: Uuid,
    user_id: Uuid,
    document_id: Uuid,
    requirement_text: String,
    category: Option<String>,
    priority: Option<String>,
    created_at: DateTime<Utc>,
}

impl RequirementRecord {
    fn into_domain(self) -> Requirement {
        Requirement {
            id: self.id,
            user_id: self.user_id,
            document_id: self.document_id,
            requirement_text: self.requirement_text,
            category: self.category,
            priority: self.priority,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ClaimRecord {
    id: Uuid,
    user_id: Uuid,
    requirements_document_id: Uuid,
    claim_document_id: Uuid,
    analysis_type: String,
    analysis_result: Option<Value>,
    status: String,
    reference: String,
    created_at: DateTime<Utc>,
}

impl ClaimRecord {
    fn into_domain(self) -> Claim {
        Claim {
            id: self.id,
            user_id: self.user_id,
            requirements_document_id: self.requirements_document_id,
            claim_document_id: self.claim_document_id,
            analysis_type: self.analysis_type,
            analysis_result: self.analysis_result,
            status: self.status,
            reference: self.reference,
            created_at: self.created_at,
        }
    }
}

// --- trait implementation --------------------------------------------------

#[async_trait]
impl DataStore for PgDataStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let record: Option<UserRecord> = sqlx::query_as(
            "SELECT id, username, email, credits, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(UserRecord::into_domain))
    }

    async fn create_user(&self, username: &str, email: &str) -> Result<User> {
        let record: UserRecord = sqlx::query_as(
            r#"
            INSERT INTO users (id, username, email)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, credits, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(record.into_domain())
    }

    async fn create_chat(&self, user_id: Uuid, title: &str) -> Result<Chat> {
        let record: ChatRecord = sqlx::query_as(
            r#"
            INSERT INTO chats (id, user_id, title)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, title, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(record.into_domain())
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
        let record: Option<ChatRecord> =
            sqlx::query_as("SELECT id, user_id, title, created_at FROM chats WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record.map(ChatRecord::into_domain))
    }

    async fn list_chats(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let records: Vec<ChatRecord> = sqlx::query_as(
            "SELECT id, user_id, title, created_at FROM chats WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(ChatRecord::into_domain).collect())
    }

    async fn set_chat_title(&self, chat_id: Uuid, title: &str) -> Result<()> {
        sqlx::query("UPDATE chats SET title = $1 WHERE id = $2")
            .bind(title)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn messages_for_chat(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let records: Vec<MessageRecord> = sqlx::query_as(
            "SELECT id, chat_id, role, content, created_at FROM messages WHERE chat_id = $1 ORDER BY created_at ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(MessageRecord::into_domain).collect()
    }

    async fn conversation_chars(&self, chat_id: Uuid) -> Result<i64> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM messages WHERE chat_id = $1",
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn commit_exchange(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<(Message, Message)> {
        let mut tx = self.pool.begin().await?;

        // Guarded decrement: zero rows affected means an empty balance and
        // the whole transaction is dropped unharmed.
        let updated = sqlx::query("UPDATE users SET credits = credits - 1 WHERE id = $1 AND credits >= 1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::InsufficientCredits);
        }

        let user_msg: MessageRecord = sqlx::query_as(
            r#"
            INSERT INTO messages (id, chat_id, role, content)
            VALUES ($1, $2, 'user', $3)
            RETURNING id, chat_id, role, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(chat_id)
        .bind(user_content)
        .fetch_one(&mut *tx)
        .await?;

        let assistant_msg: MessageRecord = sqlx::query_as(
            r#"
            INSERT INTO messages (id, chat_id, role, content)
            VALUES ($1, $2, 'assistant', $3)
            RETURNING id, chat_id, role, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(chat_id)
        .bind(assistant_content)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((user_msg.into_domain()?, assistant_msg.into_domain()?))
    }

    async fn create_document(
        &self,
        user_id: Uuid,
        filename: &str,
        content: &str,
        processing_type: &str,
    ) -> Result<Document> {
        let record: DocumentRecord = sqlx::query_as(
            r#"
            INSERT INTO documents (id, user_id, filename, content, processing_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, filename, content, processing_type,
                      processing_status, processed_content, uploaded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(filename)
        .bind(content)
        .bind(processing_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, filename))?;
        record.into_domain()
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let record: Option<DocumentRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, filename, content, processing_type,
                   processing_status, processed_content, uploaded_at
            FROM documents WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        record.map(DocumentRecord::into_domain).transpose()
    }

    async fn list_documents(&self, user_id: Uuid) -> Result<Vec<Document>> {
        let records: Vec<DocumentRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, filename, content, processing_type,
                   processing_status, processed_content, uploaded_at
            FROM documents WHERE user_id = $1 ORDER BY uploaded_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(DocumentRecord::into_domain).collect()
    }

    async fn set_document_result(
        &self,
        id: Uuid,
        processed_content: Option<Value>,
        status: ProcessingStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET processed_content = $1, processing_status = $2 WHERE id = $3",
        )
        .bind(processed_content)
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_requirements(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        entries: &[NewRequirement],
    ) -> Result<Vec<Requirement>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(entries.len());
        for entry in entries {
            let record: RequirementRecord = sqlx::query_as(
                r#"
                INSERT INTO requirements (id, user_id, document_id, requirement_text, category, priority)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, user_id, document_id, requirement_text, category, priority, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(document_id)
            .bind(&entry.text)
            .bind(&entry.category)
            .bind(&entry.priority)
            .fetch_one(&mut *tx)
            .await?;
            created.push(record.into_domain());
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn delete_requirements_for_document(&self, document_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM requirements WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn requirements_for_document(&self, document_id: Uuid) -> Result<Vec<Requirement>> {
        let records: Vec<RequirementRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, document_id, requirement_text, category, priority, created_at
            FROM requirements WHERE document_id = $1 ORDER BY created_at ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(RequirementRecord::into_domain).collect())
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
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE users SET credits = credits - 1 WHERE id = $1 AND credits >= 1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::InsufficientCredits);
        }

        let claim: ClaimRecord = sqlx::query_as(
            r#"
            INSERT INTO claims (id, user_id, requirements_document_id, claim_document_id,
                                analysis_type, analysis_result, status, reference)
            VALUES ($1, $2, $3, $4, $5, $6, 'completed', $7)
            RETURNING id, user_id, requirements_document_id, claim_document_id,
                      analysis_type, analysis_result, status, reference, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(requirements_document_id)
        .bind(claim_document_id)
        .bind(analysis_type)
        .bind(analysis_result)
        .bind(Claim::new_reference())
        .fetch_one(&mut *tx)
        .await?;

        let chat: ChatRecord = sqlx::query_as(
            r#"
            INSERT INTO chats (id, user_id, title)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, title, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(chat_title)
        .fetch_one(&mut *tx)
        .await?;

        let serialized = serde_json::to_string(analysis_result)
            .map_err(|e| AppError::Processing(e.to_string()))?;
        let message: MessageRecord = sqlx::query_as(
            r#"
            INSERT INTO messages (id, chat_id, role, content)
            VALUES ($1, $2, 'assistant', $3)
            RETURNING id, chat_id, role, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(chat.id)
        .bind(serialized)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((
            claim.into_domain(),
            chat.into_domain(),
            message.into_domain()?,
        ))
    }

    async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<Claim>> {
        let records: Vec<ClaimRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, requirements_document_id, claim_document_id,
                   analysis_type, analysis_result, status, reference, created_at
            FROM claims WHERE user_id = $1 ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(ClaimRecord::into_domain).collect())
    }
}
