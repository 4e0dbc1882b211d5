use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Service-wide error taxonomy. Every route handler returns this and the
/// `IntoResponse` impl converts it into `{"error": message}` JSON with the
/// mapped status, so no error ever crashes the process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Precondition(String),

    #[error("a document named '{0}' already exists")]
    DuplicateDocument(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("rate limit exceeded, please try again later")]
    RateLimited,

    #[error("upstream AI service unavailable: {0}")]
    Transport(String),

    #[error("AI response was not valid JSON")]
    MalformedResponse,

    #[error("document processing failed: {0}")]
    Processing(String),

    #[error("database error: {0}")]
    Database(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            AppError::AuthRequired => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized | AppError::InsufficientCredits => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Precondition(_) | AppError::DuplicateDocument(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MalformedResponse => StatusCode::BAD_GATEWAY,
            AppError::Processing(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("record"),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<relief_flow::FlowError> for AppError {
    fn from(e: relief_flow::FlowError) -> Self {
        use relief_flow::FlowError;
        match e {
            FlowError::InvalidTransition(msg) => AppError::Precondition(msg),
            FlowError::SessionNotFound(_) => AppError::NotFound("wizard session"),
            FlowError::Storage(msg) => AppError::Database(msg),
            FlowError::Serialization(e) => AppError::Processing(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(
            AppError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthorized.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::AuthRequired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::DuplicateDocument("a.pdf".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::PayloadTooLarge("x".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AppError::MalformedResponse.status(), StatusCode::BAD_GATEWAY);
    }
}
