//! The document-analysis wizard: upload requirements, upload claim/form,
//! analyze. One service instance drives both the insurance and FEMA tracks;
//! sessions are per-user, per-track.
//!
//! Step numbers are never taken from the client. Every transition is
//! re-validated against persisted document ownership and status, so a stale
//! or tampered session cannot advance past documents it does not own.

use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use relief_flow::{SessionStorage, WizardSession, WizardState, WizardTrack};

use crate::error::{AppError, Result};
use crate::extract;
use crate::llm::invoker::AnalysisInvoker;
use crate::models::{Chat, Document, MessageRole, ProcessingStatus};
use crate::prompts::AnalysisKind;
use crate::store::{DataStore, NewRequirement};

/// Input to an upload step: a fresh file, or a previously uploaded document.
pub enum UploadSource {
    File { filename: String, bytes: Vec<u8> },
    Reuse(Uuid),
}

#[derive(Clone)]
pub struct WizardService {
    store: Arc<dyn DataStore>,
    sessions: Arc<dyn SessionStorage>,
    invoker: Arc<AnalysisInvoker>,
}

impl WizardService {
    pub fn new(
        store: Arc<dyn DataStore>,
        sessions: Arc<dyn SessionStorage>,
        invoker: Arc<AnalysisInvoker>,
    ) -> Self {
        Self {
            store,
            sessions,
            invoker,
        }
    }

    /// Step 1: bind a requirements document. Also extracts structured
    /// requirement rows from the document via the LLM.
    pub async fn upload_requirements(
        &self,
        user_id: Uuid,
        track: WizardTrack,
        source: UploadSource,
    ) -> Result<(Document, WizardState)> {
        let mut session = self.load_or_create_session(user_id, track).await?;

        let processing_type = format!("{}_requirements", track.as_str());
        let document = match source {
            UploadSource::Reuse(id) => self.resolve_reusable_document(user_id, id).await?,
            UploadSource::File { filename, bytes } => {
                self.ingest_requirements_file(user_id, &processing_type, &filename, &bytes)
                    .await?
            }
        };

        session.state = session.state.clone().bind_requirements(document.id);
        session.touch();
        self.sessions.save(session.clone()).await?;

        info!(
            user_id = %user_id,
            track = track.as_str(),
            document_id = %document.id,
            step = session.state.step(),
            "requirements document bound"
        );
        Ok((document, session.state))
    }

    /// Step 2: bind the claim/form document. Requires step 1 complete.
    pub async fn upload_claim(
        &self,
        user_id: Uuid,
        track: WizardTrack,
        source: UploadSource,
    ) -> Result<(Document, WizardState)> {
        let mut session = self.load_or_create_session(user_id, track).await?;

        // Precondition, validated against storage rather than the session
        // alone: the bound requirements document must still be usable.
        let requirements_doc_id = session.state.requirements_doc().ok_or_else(|| {
            AppError::Precondition(
                "a requirements document must be uploaded before the claim document".to_string(),
            )
        })?;
        self.validate_bound_document(user_id, requirements_doc_id)
            .await?;

        let processing_type = match track {
            WizardTrack::Insurance => "insurance_claim".to_string(),
            WizardTrack::Fema => "fema_form".to_string(),
        };
        let document = match source {
            UploadSource::Reuse(id) => self.resolve_reusable_document(user_id, id).await?,
            UploadSource::File { filename, bytes } => {
                self.ingest_plain_file(user_id, &processing_type, &filename, &bytes)
                    .await?
            }
        };

        session.state = session.state.clone().bind_claim(document.id)?;
        session.touch();
        self.sessions.save(session.clone()).await?;

        info!(
            user_id = %user_id,
            track = track.as_str(),
            document_id = %document.id,
            step = session.state.step(),
            "claim document bound"
        );
        Ok((document, session.state))
    }

    /// Step 3: run the analysis, persist the claim record plus an audit
    /// chat message, and clear the session. On invoker failure the session
    /// is left untouched so the user can retry without re-uploading.
    pub async fn analyze(
        &self,
        user_id: Uuid,
        track: WizardTrack,
        analysis_type: &str,
        previous_chat_id: Option<Uuid>,
    ) -> Result<(Chat, Value)> {
        // Registry check happens before any persistence.
        let kind = AnalysisKind::parse(analysis_type)?;

        let session = self.load_or_create_session(user_id, track).await?;
        let (requirements_doc_id, claim_doc_id) =
            session.state.bound_documents().map_err(|_| {
                AppError::Precondition(
                    "both a requirements and a claim document must be uploaded before analysis"
                        .to_string(),
                )
            })?;

        let requirements_doc = self
            .validate_bound_document(user_id, requirements_doc_id)
            .await?;
        let claim_doc = self.validate_bound_document(user_id, claim_doc_id).await?;

        // Refuse early rather than burning an AI call the transaction would
        // reject anyway.
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(AppError::NotFound("user"))?;
        if user.credits < 1 {
            return Err(AppError::InsufficientCredits);
        }

        let prior_messages = match previous_chat_id {
            Some(chat_id) => self.prior_assistant_messages(user_id, chat_id).await?,
            None => Vec::new(),
        };

        let analysis = self
            .invoker
            .analyze(kind, &requirements_doc.content, &claim_doc.content, &prior_messages)
            .await?;

        let chat_title = format!("{} analysis: {}", track_label(track), kind.as_str());
        let (claim, chat, _message) = self
            .store
            .commit_analysis(
                user_id,
                requirements_doc.id,
                claim_doc.id,
                kind.as_str(),
                &analysis,
                &chat_title,
            )
            .await?;

        self.sessions
            .delete(&WizardSession::key(user_id, track))
            .await?;

        info!(
            user_id = %user_id,
            track = track.as_str(),
            claim_id = %claim.id,
            reference = %claim.reference,
            analysis_type = kind.as_str(),
            "analysis completed"
        );
        Ok((chat, analysis))
    }

    pub async fn current_state(&self, user_id: Uuid, track: WizardTrack) -> Result<WizardState> {
        let session = self.load_or_create_session(user_id, track).await?;
        Ok(session.state)
    }

    pub async fn reset(&self, user_id: Uuid, track: WizardTrack) -> Result<()> {
        self.sessions
            .delete(&WizardSession::key(user_id, track))
            .await?;
        Ok(())
    }

    // --- internals ---------------------------------------------------------

    async fn load_or_create_session(
        &self,
        user_id: Uuid,
        track: WizardTrack,
    ) -> Result<WizardSession> {
        let key = WizardSession::key(user_id, track);
        match self.sessions.get(&key).await? {
            Some(session) => Ok(session),
            None => Ok(WizardSession::new(user_id, track)),
        }
    }

    /// A document bound into a wizard step must exist, belong to the
    /// caller, and have completed processing.
    async fn validate_bound_document(&self, user_id: Uuid, doc_id: Uuid) -> Result<Document> {
        let document = self
            .store
            .get_document(doc_id)
            .await?
            .ok_or(AppError::NotFound("document"))?;
        if document.user_id != user_id {
            return Err(AppError::Unauthorized);
        }
        if document.processing_status != ProcessingStatus::Completed {
            return Err(AppError::Precondition(format!(
                "document '{}' is {} and cannot be used for analysis",
                document.filename,
                document.processing_status.as_str()
            )));
        }
        Ok(document)
    }

    async fn resolve_reusable_document(&self, user_id: Uuid, doc_id: Uuid) -> Result<Document> {
        self.validate_bound_document(user_id, doc_id).await
    }

    /// Create + extract, no AI post-processing. Document ends completed or
    /// failed, never pending.
    async fn ingest_plain_file(
        &self,
        user_id: Uuid,
        processing_type: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Document> {
        let filename = extract::sanitize_filename(filename);
        extract::validate_extension(&filename)?;
        let text = extract::extract_text(&filename, bytes).await?;

        let document = self
            .store
            .create_document(user_id, &filename, &text, processing_type)
            .await?;
        self.store
            .set_document_result(document.id, None, ProcessingStatus::Completed)
            .await?;

        self.store
            .get_document(document.id)
            .await?
            .ok_or(AppError::NotFound("document"))
    }

    /// Create + extract + parse structured requirement entries. On any
    /// processing failure the document is marked failed and partially
    /// created requirement rows are rolled back.
    async fn ingest_requirements_file(
        &self,
        user_id: Uuid,
        processing_type: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Document> {
        let filename = extract::sanitize_filename(filename);
        extract::validate_extension(&filename)?;
        let text = extract::extract_text(&filename, bytes).await?;

        let document = self
            .store
            .create_document(user_id, &filename, &text, processing_type)
            .await?;

        match self.structure_requirements(user_id, document.id, &text).await {
            Ok(count) => {
                self.store
                    .set_document_result(
                        document.id,
                        Some(json!({ "requirement_count": count })),
                        ProcessingStatus::Completed,
                    )
                    .await?;
            }
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "requirements processing failed");
                self.store
                    .delete_requirements_for_document(document.id)
                    .await?;
                self.store
                    .set_document_result(document.id, None, ProcessingStatus::Failed)
                    .await?;
                return Err(AppError::Processing(format!(
                    "failed to process requirements document: {e}"
                )));
            }
        }

        self.store
            .get_document(document.id)
            .await?
            .ok_or(AppError::NotFound("document"))
    }

    async fn structure_requirements(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        text: &str,
    ) -> Result<usize> {
        let parsed = self.invoker.extract_requirements(text).await?;
        let entries: Vec<NewRequirement> = parsed
            .into_iter()
            .map(|r| NewRequirement {
                text: r.text,
                category: r.category,
                priority: r.priority,
            })
            .collect();
        let created = self
            .store
            .insert_requirements(user_id, document_id, &entries)
            .await?;
        Ok(created.len())
    }

    async fn prior_assistant_messages(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
    ) -> Result<Vec<String>> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or(AppError::NotFound("chat"))?;
        if chat.user_id != user_id {
            return Err(AppError::Unauthorized);
        }
        let messages = self.store.messages_for_chat(chat_id).await?;
        Ok(messages
            .into_iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content)
            .collect())
    }
}

fn track_label(track: WizardTrack) -> &'static str {
    match track {
        WizardTrack::Insurance => "Insurance",
        WizardTrack::Fema => "FEMA",
    }
}
