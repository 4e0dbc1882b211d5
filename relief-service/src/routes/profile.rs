//! Profile endpoints: who am I, and what have I done so far.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{Chat, Claim, Document};
use crate::routes::{AppState, CurrentUser};

const RECENT_ITEMS: usize = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/profile/report", get(report))
}

#[derive(Debug, Serialize)]
struct ProfileResponse {
    id: uuid::Uuid,
    username: String,
    email: String,
    credits: i32,
}

#[derive(Debug, Serialize)]
struct ActivityReport {
    chat_count: usize,
    document_count: usize,
    claim_count: usize,
    /// Documents grouped by processing type.
    documents_by_type: BTreeMap<String, usize>,
    recent_chats: Vec<Chat>,
    recent_documents: Vec<Document>,
    recent_claims: Vec<Claim>,
}

async fn profile(user: CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        id: user.0.id,
        username: user.0.username,
        email: user.0.email,
        credits: user.0.credits,
    })
}

async fn report(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ActivityReport>> {
    let chats = state.store.list_chats(user.0.id).await?;
    let documents = state.store.list_documents(user.0.id).await?;
    let claims = state.store.claims_for_user(user.0.id).await?;

    let mut documents_by_type: BTreeMap<String, usize> = BTreeMap::new();
    for document in &documents {
        *documents_by_type
            .entry(document.processing_type.clone())
            .or_default() += 1;
    }

    Ok(Json(ActivityReport {
        chat_count: chats.len(),
        document_count: documents.len(),
        claim_count: claims.len(),
        documents_by_type,
        recent_chats: chats.into_iter().take(RECENT_ITEMS).collect(),
        recent_documents: documents.into_iter().take(RECENT_ITEMS).collect(),
        recent_claims: claims.into_iter().take(RECENT_ITEMS).collect(),
    }))
}
