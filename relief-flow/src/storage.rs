use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::debug;

use crate::error::{FlowError, Result};
use crate::session::WizardSession;

/// Trait for storing and retrieving wizard sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: WizardSession) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<WizardSession>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, WizardSession>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: WizardSession) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WizardSession>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

/// PostgreSQL implementation of SessionStorage. The serialized wizard
/// state lives in a JSONB column so schema changes in the state enum do
/// not require a migration.
pub struct PostgresSessionStorage {
    pool: PgPool,
}

impl PostgresSessionStorage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let storage = Self { pool };
        storage.ensure_table().await?;
        Ok(storage)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wizard_sessions (
                id TEXT PRIMARY KEY,
                session JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for PostgresSessionStorage {
    async fn save(&self, session: WizardSession) -> Result<()> {
        let body = serde_json::to_value(&session)?;
        sqlx::query(
            r#"
            INSERT INTO wizard_sessions (id, session, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (id) DO UPDATE SET session = $2, updated_at = now()
            "#,
        )
        .bind(&session.id)
        .bind(body)
        .execute(&self.pool)
        .await?;
        debug!(session_id = %session.id, "wizard session saved");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WizardSession>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT session FROM wizard_sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((body,)) => {
                let session = serde_json::from_value(body)
                    .map_err(|e| FlowError::Storage(format!("corrupt session {id}: {e}")))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM wizard_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
