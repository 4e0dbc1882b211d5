use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    /// The requested transition is not legal from the current state,
    /// e.g. binding a claim document before a requirements document.
    #[error("invalid wizard transition: {0}")]
    InvalidTransition(String),

    #[error("wizard session not found: {0}")]
    SessionNotFound(String),

    #[error("session storage error: {0}")]
    Storage(String),

    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for FlowError {
    fn from(e: sqlx::Error) -> Self {
        FlowError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
