use crate::AppState;
use axum::{extract::State, http::Request, middleware::Next, response::Response};
use keymeter_core::error::UsageError;

/// Guards internal routes with the configured admin tokens.
/// With no tokens configured the internal routes are closed.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, UsageError> {
    let config = state.config.load();

    if config.admin_tokens_set.is_empty() {
        return Err(UsageError::Unauthorized(
            "usage ingestion is disabled: no admin tokens configured".to_string(),
        ));
    }

    // Authorization: Bearer or x-api-key
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| {
            request
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
        });

    match token {
        Some(t) if config.admin_tokens_set.contains(t) => Ok(next.run(request).await),
        _ => Err(UsageError::Unauthorized("invalid admin token".to_string())),
    }
}
