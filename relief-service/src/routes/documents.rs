//! Generic document endpoints: list what a user uploaded, and accept
//! uploads outside any wizard (processing type `text`, no AI step).

use axum::extract::{Request, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{AppError, Result};
use crate::models::{Document, ProcessingStatus, UploadResponse};
use crate::routes::{AppState, CurrentUser, read_upload_source};
use crate::wizard::UploadSource;

pub fn router() -> Router<AppState> {
    Router::new().route("/documents", get(list_documents).post(upload_document))
}

async fn list_documents(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Document>>> {
    Ok(Json(state.store.list_documents(user.0.id).await?))
}

async fn upload_document(
    State(state): State<AppState>,
    user: CurrentUser,
    req: Request,
) -> Result<Json<UploadResponse>> {
    let UploadSource::File { filename, bytes } = read_upload_source(req).await? else {
        return Err(AppError::Validation(
            "generic uploads require a file, not a document reference".to_string(),
        ));
    };

    let filename = crate::extract::sanitize_filename(&filename);
    crate::extract::validate_extension(&filename)?;
    let text = crate::extract::extract_text(&filename, &bytes).await?;

    let document = state
        .store
        .create_document(user.0.id, &filename, &text, "text")
        .await?;
    state
        .store
        .set_document_result(document.id, None, ProcessingStatus::Completed)
        .await?;

    Ok(Json(UploadResponse {
        document_id: document.id,
        filename: document.filename,
        step: None,
    }))
}
