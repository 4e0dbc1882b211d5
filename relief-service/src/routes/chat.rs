//! General assistant chat: credit-metered, length-guarded conversations.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::llm::{ChatTurn, chat_with_backoff};
use crate::models::{Chat, Message, NewChatRequest, SendMessageRequest, SendMessageResponse};
use crate::prompts::CHAT_SYSTEM_PROMPT;
use crate::routes::{AppState, CurrentUser};

/// Hard ceiling on cumulative conversation size, counted in characters
/// across every stored message plus the incoming one.
pub const MAX_CONVERSATION_CHARS: i64 = 250_000;

/// How many trailing messages accompany each completion request.
const CONTEXT_MESSAGES: usize = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", get(list_chats).post(new_chat))
        .route("/chat/{id}", get(chat_messages))
        .route("/chat/{id}/messages", post(send_message))
}

async fn list_chats(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Chat>>> {
    Ok(Json(state.store.list_chats(user.0.id).await?))
}

async fn new_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewChatRequest>,
) -> Result<Json<Chat>> {
    let title = req.title.as_deref().unwrap_or("New Chat");
    let chat = state.store.create_chat(user.0.id, title).await?;
    Ok(Json(chat))
}

async fn chat_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>> {
    owned_chat(&state, &user, chat_id).await?;
    Ok(Json(state.store.messages_for_chat(chat_id).await?))
}

async fn send_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("message content is empty".to_string()));
    }

    owned_chat(&state, &user, chat_id).await?;

    if user.0.credits < 1 {
        return Err(AppError::InsufficientCredits);
    }

    // Length guard before anything is persisted or sent upstream. Counted
    // in characters to match the store's accounting.
    let total = state.store.conversation_chars(chat_id).await? + content.chars().count() as i64;
    if total > MAX_CONVERSATION_CHARS {
        return Err(AppError::PayloadTooLarge(format!(
            "conversation exceeds the {MAX_CONVERSATION_CHARS} character limit"
        )));
    }

    let prior = state.store.messages_for_chat(chat_id).await?;
    let first_exchange = prior.is_empty();
    let history: Vec<ChatTurn> = prior
        .iter()
        .rev()
        .take(CONTEXT_MESSAGES)
        .rev()
        .map(|m| ChatTurn {
            role: m.role,
            content: m.content.clone(),
        })
        .collect();

    let reply = chat_with_backoff(state.model.as_ref(), CHAT_SYSTEM_PROMPT, history, content)
        .await
        .map_err(AppError::from)?;

    // Messages and the credit decrement land in one transaction.
    let (user_message, assistant_message) = state
        .store
        .commit_exchange(chat_id, user.0.id, content, &reply)
        .await?;

    if first_exchange {
        state
            .store
            .set_chat_title(chat_id, &derive_title(content))
            .await?;
    }

    Ok(Json(SendMessageResponse {
        user_message,
        assistant_message,
    }))
}

async fn owned_chat(state: &AppState, user: &CurrentUser, chat_id: Uuid) -> Result<Chat> {
    let chat = state
        .store
        .get_chat(chat_id)
        .await?
        .ok_or(AppError::NotFound("chat"))?;
    if chat.user_id != user.0.id {
        return Err(AppError::Unauthorized);
    }
    Ok(chat)
}

/// Chat title from the first user message: its first five words.
fn derive_title(content: &str) -> String {
    content.split_whitespace().take(5).collect::<Vec<_>>().join(" ")
}
