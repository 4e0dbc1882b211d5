//! HTTP facade for the analysis wizard. The insurance and FEMA trees are
//! the same router instantiated with a different track; only the step-2
//! route name differs (`upload-claim` vs `upload-form`).

use axum::extract::{Request, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};

use relief_flow::WizardTrack;

use crate::error::Result;
use crate::models::{AnalyzeRequest, AnalyzeResponse, UploadResponse, WizardStateResponse};
use crate::routes::{AppState, CurrentUser, read_upload_source};

pub fn router(track: WizardTrack) -> Router<AppState> {
    let claim_route = match track {
        WizardTrack::Insurance => "/upload-claim",
        WizardTrack::Fema => "/upload-form",
    };
    Router::new()
        .route("/upload-requirements", post(upload_requirements))
        .route(claim_route, post(upload_claim))
        .route("/analyze", post(analyze))
        .route("/wizard", get(wizard_state))
        .route("/reset", post(reset))
        .layer(Extension(track))
}

async fn upload_requirements(
    State(state): State<AppState>,
    Extension(track): Extension<WizardTrack>,
    user: CurrentUser,
    req: Request,
) -> Result<Json<UploadResponse>> {
    let source = read_upload_source(req).await?;
    let (document, wizard_state) = state
        .wizard
        .upload_requirements(user.0.id, track, source)
        .await?;
    Ok(Json(UploadResponse {
        document_id: document.id,
        filename: document.filename,
        step: Some(wizard_state.step()),
    }))
}

async fn upload_claim(
    State(state): State<AppState>,
    Extension(track): Extension<WizardTrack>,
    user: CurrentUser,
    req: Request,
) -> Result<Json<UploadResponse>> {
    let source = read_upload_source(req).await?;
    let (document, wizard_state) = state.wizard.upload_claim(user.0.id, track, source).await?;
    Ok(Json(UploadResponse {
        document_id: document.id,
        filename: document.filename,
        step: Some(wizard_state.step()),
    }))
}

async fn analyze(
    State(state): State<AppState>,
    Extension(track): Extension<WizardTrack>,
    user: CurrentUser,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>> {
    let (chat, analysis_result) = state
        .wizard
        .analyze(user.0.id, track, &req.analysis_type, req.previous_chat_id)
        .await?;
    Ok(Json(AnalyzeResponse {
        chat_id: chat.id,
        analysis_result,
    }))
}

async fn wizard_state(
    State(state): State<AppState>,
    Extension(track): Extension<WizardTrack>,
    user: CurrentUser,
) -> Result<Json<WizardStateResponse>> {
    let wizard_state = state.wizard.current_state(user.0.id, track).await?;
    Ok(Json(WizardStateResponse {
        step: wizard_state.step(),
        requirements_doc_id: wizard_state.requirements_doc(),
        claim_doc_id: wizard_state.claim_doc(),
    }))
}

async fn reset(
    State(state): State<AppState>,
    Extension(track): Extension<WizardTrack>,
    user: CurrentUser,
) -> Result<Json<WizardStateResponse>> {
    state.wizard.reset(user.0.id, track).await?;
    Ok(Json(WizardStateResponse {
        step: 1,
        requirements_doc_id: None,
        claim_doc_id: None,
    }))
}
