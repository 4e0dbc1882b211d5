//! Stand-alone rejection simulation: upload a document, get back 25
//! prioritized rejection reasons. The latest analysis is kept per user in
//! memory only; restarting the service clears it.

use axum::extract::{Request, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, Result};
use crate::llm::invoker::parse_json_response;
use crate::models::ProcessingStatus;
use crate::prompts::REJECTION_SIMULATION_PROMPT;
use crate::routes::{AppState, CurrentUser, read_upload_source};
use crate::wizard::UploadSource;

/// Explicit ceiling on the simulation call. Rejection runs are the
/// longest prompts the service sends.
const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(60);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_and_analyze))
        .route("/clear", post(clear))
}

async fn upload_and_analyze(
    State(state): State<AppState>,
    user: CurrentUser,
    req: Request,
) -> Result<Json<Value>> {
    let source = read_upload_source(req).await?;
    let (filename, text) = match source {
        UploadSource::File { filename, bytes } => {
            let filename = crate::extract::sanitize_filename(&filename);
            crate::extract::validate_extension(&filename)?;
            let text = crate::extract::extract_text(&filename, &bytes).await?;
            (filename, text)
        }
        UploadSource::Reuse(id) => {
            let document = state
                .store
                .get_document(id)
                .await?
                .ok_or(AppError::NotFound("document"))?;
            if document.user_id != user.0.id {
                return Err(AppError::Unauthorized);
            }
            (document.filename, document.content)
        }
    };

    let document = match state
        .store
        .create_document(user.0.id, &filename, &text, "rejection_simulation")
        .await
    {
        Ok(document) => Some(document),
        // Re-analyzing an already-stored document is allowed.
        Err(AppError::DuplicateDocument(_)) => None,
        Err(e) => return Err(e),
    };

    // Any simulation failure resolves the document to `failed`; it must
    // never stay `pending` after the request returns.
    let analysis = match run_simulation(&state, &text).await {
        Ok(analysis) => analysis,
        Err(e) => {
            if let Some(document) = &document {
                state
                    .store
                    .set_document_result(document.id, None, ProcessingStatus::Failed)
                    .await?;
            }
            return Err(e);
        }
    };

    if let Some(document) = &document {
        state
            .store
            .set_document_result(
                document.id,
                Some(analysis.clone()),
                ProcessingStatus::Completed,
            )
            .await?;
    }
    state.rejections.insert(user.0.id, analysis.clone());

    info!(user_id = %user.0.id, filename = %filename, "rejection simulation completed");
    Ok(Json(json!({
        "filename": filename,
        "analysis": analysis,
    })))
}

/// The timeout-bounded LLM call plus JSON parse, with no persistence.
async fn run_simulation(state: &AppState, text: &str) -> Result<Value> {
    let call = crate::llm::chat_with_backoff(
        state.model.as_ref(),
        REJECTION_SIMULATION_PROMPT,
        vec![],
        text,
    );
    let response = tokio::time::timeout(ANALYSIS_TIMEOUT, call)
        .await
        .map_err(|_| {
            AppError::Transport("rejection analysis timed out after 60 seconds".to_string())
        })?
        .map_err(AppError::from)?;
    parse_json_response(&response)
}

/// Routed at the bare `/rejection` path by the outer router.
pub async fn last_analysis(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Value>> {
    let analysis = state
        .rejections
        .get(&user.0.id)
        .map(|entry| entry.value().clone())
        .ok_or(AppError::NotFound("rejection analysis"))?;
    Ok(Json(analysis))
}

async fn clear(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    state.rejections.remove(&user.0.id);
    Ok(Json(json!({ "cleared": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::http::header::CONTENT_TYPE;
    use std::sync::Arc;

    use crate::llm::LlmError;
    use crate::llm::testing::ScriptedModel;
    use crate::models::User;
    use crate::store::DataStore;
    use crate::store::memory::InMemoryDataStore;
    use relief_flow::InMemorySessionStorage;

    const BOUNDARY: &str = "rejection-test-boundary";
    const REASONS_REPLY: &str =
        r#"{"rejection_reasons": [{"number": 1, "priority": "High", "reason": "missing receipts"}]}"#;

    fn fixture(
        replies: Vec<std::result::Result<String, LlmError>>,
    ) -> (AppState, Arc<InMemoryDataStore>, User) {
        let store = Arc::new(InMemoryDataStore::new());
        let user = store.seed_user(50);
        let state = AppState::new(
            store.clone(),
            Arc::new(InMemorySessionStorage::new()),
            Arc::new(ScriptedModel::new(replies)),
        );
        (state, store, user)
    }

    fn upload_request(filename: &str, content: &str) -> Request {
        HttpRequest::post("/rejection/upload")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: text/plain\r\n\r\n\
                 {content}\r\n\
                 --{BOUNDARY}--\r\n"
            )))
            .unwrap()
    }

    #[tokio::test]
    async fn malformed_reply_marks_document_failed() {
        let (state, store, user) = fixture(vec![Ok("definitely not json".to_string())]);

        let err = upload_and_analyze(
            State(state),
            CurrentUser(user.clone()),
            upload_request("policy.txt", "coverage terms"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse));

        // The document must be resolved, never left pending.
        let docs = store.list_documents(user.id).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].processing_status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn transport_failure_marks_document_failed() {
        let (state, store, user) = fixture(vec![]);

        let err = upload_and_analyze(
            State(state.clone()),
            CurrentUser(user.clone()),
            upload_request("policy.txt", "coverage terms"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));

        let docs = store.list_documents(user.id).await.unwrap();
        assert_eq!(docs[0].processing_status, ProcessingStatus::Failed);
        assert!(!state.rejections.contains_key(&user.id));
    }

    #[tokio::test]
    async fn successful_run_completes_document_and_caches_analysis() {
        let (state, store, user) = fixture(vec![Ok(REASONS_REPLY.to_string())]);

        upload_and_analyze(
            State(state.clone()),
            CurrentUser(user.clone()),
            upload_request("policy.txt", "coverage terms"),
        )
        .await
        .unwrap();

        let docs = store.list_documents(user.id).await.unwrap();
        assert_eq!(docs[0].processing_status, ProcessingStatus::Completed);
        assert!(state.rejections.contains_key(&user.id));
    }
}
