//! Resource-finder chat. Stateless on disk: each user carries a rolling
//! in-memory context of their last few turns, nothing is persisted and no
//! credits are charged.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::llm::{ChatTurn, chat_with_backoff};
use crate::models::{ResourceChatRequest, ResourceChatResponse};
use crate::prompts::RESOURCE_FINDER_PROMPT;
use crate::routes::{AppState, CurrentUser};

/// Rolling window: the last 4 turns ride along with each request.
const CONTEXT_TURNS: usize = 4;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/clear", post(clear))
}

async fn chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ResourceChatRequest>,
) -> Result<Json<ResourceChatResponse>> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("message is empty".to_string()));
    }

    let history: Vec<ChatTurn> = state
        .resource_contexts
        .get(&user.0.id)
        .map(|entry| entry.value().clone())
        .unwrap_or_default();

    let response = chat_with_backoff(
        state.model.as_ref(),
        RESOURCE_FINDER_PROMPT,
        history.clone(),
        message,
    )
    .await
    .map_err(AppError::from)?;

    let mut context = history;
    context.push(ChatTurn::user(message));
    context.push(ChatTurn::assistant(response.clone()));
    if context.len() > CONTEXT_TURNS {
        context.drain(..context.len() - CONTEXT_TURNS);
    }
    state.resource_contexts.insert(user.0.id, context);

    Ok(Json(ResourceChatResponse { response }))
}

async fn clear(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    state.resource_contexts.remove(&user.0.id);
    Ok(Json(json!({ "cleared": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::llm::testing::ScriptedModel;
    use crate::store::memory::InMemoryDataStore;
    use relief_flow::InMemorySessionStorage;
    use std::sync::Arc;

    #[tokio::test]
    async fn context_window_keeps_last_four_turns() {
        let store = Arc::new(InMemoryDataStore::new());
        let user = store.seed_user(50);
        let replies: Vec<std::result::Result<String, LlmError>> =
            (0..4).map(|i| Ok(format!("answer {i}"))).collect();
        let state = AppState::new(
            store,
            Arc::new(InMemorySessionStorage::new()),
            Arc::new(ScriptedModel::new(replies)),
        );

        for i in 0..4 {
            chat(
                State(state.clone()),
                CurrentUser(user.clone()),
                Json(ResourceChatRequest {
                    message: format!("question {i}"),
                }),
            )
            .await
            .unwrap();
        }

        let context = state.resource_contexts.get(&user.id).unwrap().clone();
        assert_eq!(context.len(), 4);
        // Oldest turns rolled off; the window ends with the latest answer.
        assert_eq!(context[3].content, "answer 3");
        assert_eq!(context[2].content, "question 3");
    }

    #[tokio::test]
    async fn clear_drops_the_context() {
        let store = Arc::new(InMemoryDataStore::new());
        let user = store.seed_user(50);
        let state = AppState::new(
            store,
            Arc::new(InMemorySessionStorage::new()),
            Arc::new(ScriptedModel::replying("here are some shelters")),
        );

        chat(
            State(state.clone()),
            CurrentUser(user.clone()),
            Json(ResourceChatRequest {
                message: "where can I find shelter".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(state.resource_contexts.contains_key(&user.id));

        clear(State(state.clone()), CurrentUser(user.clone()))
            .await
            .unwrap();
        assert!(!state.resource_contexts.contains_key(&user.id));
    }
}
