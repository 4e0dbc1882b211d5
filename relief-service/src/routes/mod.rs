//! HTTP surface. State is injected, handlers stay thin, and every error
//! leaves as `{"error": message}` JSON via [`AppError`]'s `IntoResponse`.

pub mod chat;
pub mod documents;
pub mod profile;
pub mod rejection;
pub mod resources;
pub mod wizard;

use axum::extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use relief_flow::{SessionStorage, WizardTrack};

use crate::error::{AppError, Result};
use crate::extract::MAX_UPLOAD_BYTES;
use crate::llm::{ChatModel, ChatTurn};
use crate::llm::invoker::AnalysisInvoker;
use crate::models::{ReuseDocumentRequest, User};
use crate::store::DataStore;
use crate::wizard::{UploadSource, WizardService};

// Headroom for multipart framing on top of the document size cap.
const BODY_LIMIT_BYTES: usize = MAX_UPLOAD_BYTES + 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub model: Arc<dyn ChatModel>,
    pub wizard: WizardService,
    /// Last rejection analysis per user. Ephemeral by design.
    pub rejections: Arc<DashMap<Uuid, Value>>,
    /// Rolling resource-finder context per user.
    pub resource_contexts: Arc<DashMap<Uuid, Vec<ChatTurn>>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DataStore>,
        sessions: Arc<dyn SessionStorage>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let invoker = Arc::new(AnalysisInvoker::new(model.clone()));
        let wizard = WizardService::new(store.clone(), sessions, invoker);
        Self {
            store,
            model,
            wizard,
            rejections: Arc::new(DashMap::new()),
            resource_contexts: Arc::new(DashMap::new()),
        }
    }
}

/// The authenticated caller. Identity arrives from the auth layer in the
/// `x-user-id` header; absent, malformed, or unknown ids are 401.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::AuthRequired)?;
        let id = Uuid::parse_str(raw).map_err(|_| AppError::AuthRequired)?;
        let user = state
            .store
            .get_user(id)
            .await?
            .ok_or(AppError::AuthRequired)?;
        Ok(CurrentUser(user))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(chat::router())
        .merge(documents::router())
        .merge(profile::router())
        .nest("/insurance", wizard::router(WizardTrack::Insurance))
        .nest("/fema", wizard::router(WizardTrack::Fema))
        .route("/rejection", get(rejection::last_analysis))
        .nest("/rejection", rejection::router())
        .nest("/resources", resources::router())
        .layer(middleware::from_fn(correlation_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Tags every request with a correlation id (propagated from the caller or
/// freshly minted) and wraps handling in a span carrying it.
async fn correlation_id(req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}

/// Reads an upload request body as either a JSON `{reuse_document_id}`
/// envelope or a multipart form with a `file` part.
pub async fn read_upload_source(req: Request) -> Result<UploadSource> {
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        let bytes = axum::body::to_bytes(req.into_body(), BODY_LIMIT_BYTES)
            .await
            .map_err(|_| AppError::PayloadTooLarge("request body too large".to_string()))?;
        let body: ReuseDocumentRequest = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Validation(format!("invalid reuse request: {e}")))?;
        return Ok(UploadSource::Reuse(body.reuse_document_id));
    }

    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_owned)
                .ok_or_else(|| {
                    AppError::Validation("file part is missing a filename".to_string())
                })?;
            let bytes = field
                .bytes()
                .await
                .map_err(|_| AppError::PayloadTooLarge("file part too large".to_string()))?;
            return Ok(UploadSource::File {
                filename,
                bytes: bytes.to_vec(),
            });
        }
    }
    Err(AppError::Validation(
        "multipart body must contain a 'file' part".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::llm::LlmError;
    use crate::llm::testing::ScriptedModel;
    use crate::store::memory::InMemoryDataStore;
    use relief_flow::InMemorySessionStorage;

    const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

    fn app(replies: Vec<std::result::Result<String, LlmError>>) -> (Router, User) {
        let store = Arc::new(InMemoryDataStore::new());
        let user = store.seed_user(50);
        let state = AppState::new(
            store,
            Arc::new(InMemorySessionStorage::new()),
            Arc::new(ScriptedModel::new(replies)),
        );
        (build_router(state), user)
    }

    fn multipart_file(filename: &str, content: &str) -> Body {
        Body::from(format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        ))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_requires_no_auth() {
        let (app, _) = app(vec![]);
        let response = app
            .oneshot(
                HttpRequest::get("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_user_header_is_401_json() {
        let (app, _) = app(vec![]);
        let response = app
            .oneshot(
                HttpRequest::get("/documents")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn unknown_user_id_is_401() {
        let (app, _) = app(vec![]);
        let response = app
            .oneshot(
                HttpRequest::get("/documents")
                    .header("x-user-id", Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_upload_conflicts_with_error_body() {
        let (app, user) = app(vec![]);

        let upload = |app: Router| {
            let user_id = user.id.to_string();
            async move {
                app.oneshot(
                    HttpRequest::post("/documents")
                        .header("x-user-id", user_id)
                        .header(
                            CONTENT_TYPE,
                            format!("multipart/form-data; boundary={BOUNDARY}"),
                        )
                        .body(multipart_file("inventory.txt", "damaged items list"))
                        .unwrap(),
                )
                .await
                .unwrap()
            }
        };

        let first = upload(app.clone()).await;
        assert_eq!(first.status(), StatusCode::OK);
        let body = body_json(first).await;
        assert_eq!(body["filename"], "inventory.txt");

        let second = upload(app).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body = body_json(second).await;
        assert!(body["error"].as_str().unwrap().contains("inventory.txt"));
    }

    #[tokio::test]
    async fn analyze_without_documents_is_409() {
        let (app, user) = app(vec![]);
        let response = app
            .oneshot(
                HttpRequest::post("/insurance/analyze")
                    .header("x-user-id", user.id.to_string())
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"analysis_type": "explain"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn wizard_state_starts_at_step_one() {
        let (app, user) = app(vec![]);
        let response = app
            .oneshot(
                HttpRequest::get("/fema/wizard")
                    .header("x-user-id", user.id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["step"], 1);
    }

    #[tokio::test]
    async fn exe_extension_is_rejected_before_processing() {
        let (app, user) = app(vec![]);
        let response = app
            .oneshot(
                HttpRequest::post("/documents")
                    .header("x-user-id", user.id.to_string())
                    .header(
                        CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(multipart_file("malware.exe", "MZ"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wizard_reuse_path_accepts_json_reference() {
        let (app, user) = app(vec![Ok(
            r#"{"requirements": [{"text": "keep receipts", "category": "evidence", "priority": "high"}]}"#
                .to_string(),
        )]);

        // Seed a completed document through the generic upload route.
        let upload = app
            .clone()
            .oneshot(
                HttpRequest::post("/documents")
                    .header("x-user-id", user.id.to_string())
                    .header(
                        CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(multipart_file("policy.txt", "policy terms"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let document_id = body_json(upload).await["document_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(
                HttpRequest::post("/insurance/upload-requirements")
                    .header("x-user-id", user.id.to_string())
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(format!(
                        r#"{{"reuse_document_id": "{document_id}"}}"#
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["step"], 2);
    }
}
