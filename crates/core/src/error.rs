use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for usage reporting and ingestion.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("{0}")]
    MissingParameter(String),

    #[error("Invalid {field} format, use YYYY-MM-DD")]
    InvalidDateFormat { field: &'static str },

    #[error("API key not found")]
    KeyNotFound,

    #[error("API key is not active")]
    KeyInactive,

    #[error("failed to aggregate usage: {0}")]
    Aggregator(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl UsageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_)
            | Self::InvalidDateFormat { .. }
            | Self::KeyInactive
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::KeyNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Aggregator(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable tag carried in the error envelope.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "MISSING_PARAMETER",
            Self::InvalidDateFormat { .. } => "INVALID_DATE_FORMAT",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::KeyInactive => "KEY_INACTIVE",
            Self::Aggregator(_) => "AGGREGATOR_FAILURE",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Config(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for UsageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "code": status.as_u16(),
            "message": self.to_string(),
            "reason": self.reason(),
        });

        (
            status,
            [("content-type", "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

impl From<serde_json::Error> for UsageError {
    fn from(e: serde_json::Error) -> Self {
        Self::BadRequest(format!("invalid JSON body: {e}"))
    }
}
