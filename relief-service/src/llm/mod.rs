pub mod invoker;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{Chat, Message};
use rig::providers::openrouter;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::MessageRole;

/// One prior turn of a conversation, provider-agnostic.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited by upstream provider")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimited => AppError::RateLimited,
            LlmError::Transport(msg) => AppError::Transport(msg),
        }
    }
}

/// Seam in front of the completion provider so request handlers and tests
/// never talk to the network directly.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `prompt` with a system preamble and prior history, returning
    /// the assistant's reply text.
    async fn chat(
        &self,
        system: &str,
        history: Vec<ChatTurn>,
        prompt: &str,
    ) -> Result<String, LlmError>;
}

/// OpenRouter-backed implementation.
pub struct OpenRouterModel {
    client: openrouter::Client,
    model: String,
}

impl OpenRouterModel {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        Self {
            client: openrouter::Client::new(api_key),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenRouterModel {
    async fn chat(
        &self,
        system: &str,
        history: Vec<ChatTurn>,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let agent = self.client.agent(&self.model).preamble(system).build();

        let rig_history: Vec<Message> = history
            .into_iter()
            .map(|turn| match turn.role {
                MessageRole::User => Message::user(turn.content),
                MessageRole::Assistant => Message::assistant(turn.content),
            })
            .collect();

        let response = agent.chat(prompt, rig_history).await.map_err(|e| {
            let msg = e.to_string();
            let lowered = msg.to_ascii_lowercase();
            if lowered.contains("rate limit") || lowered.contains("429") {
                LlmError::RateLimited
            } else {
                LlmError::Transport(msg)
            }
        })?;

        info!(model = %self.model, chars = response.len(), "completion received");
        Ok(response)
    }
}

/// Delay before retry attempt N, capped at 60 seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(60))
}

/// Chat-message pathway: retry rate-limited calls with capped exponential
/// backoff, up to 5 attempts. Transport errors are terminal; the caller
/// retries, not us.
pub async fn chat_with_backoff(
    model: &dyn ChatModel,
    system: &str,
    history: Vec<ChatTurn>,
    prompt: &str,
) -> Result<String, LlmError> {
    const MAX_ATTEMPTS: u32 = 5;

    for attempt in 0..MAX_ATTEMPTS {
        match model.chat(system, history.clone(), prompt).await {
            Ok(response) => return Ok(response),
            Err(LlmError::RateLimited) if attempt + 1 < MAX_ATTEMPTS => {
                let delay = backoff_delay(attempt);
                warn!(attempt, delay_secs = delay.as_secs(), "rate limited, backing off");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(LlmError::RateLimited)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scripted model for tests: pops canned replies in order; an empty
    /// script yields transport errors.
    pub struct ScriptedModel {
        replies: Mutex<Vec<Result<String, LlmError>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(reply: &str) -> Self {
            Self::new(vec![Ok(reply.to_string())])
        }

        pub fn failing() -> Self {
            Self::new(vec![])
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(
            &self,
            _system: &str,
            _history: Vec<ChatTurn>,
            prompt: &str,
        ) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(LlmError::Transport("no scripted reply".to_string()))
            } else {
                replies.remove(0)
            }
        }
    }
}
