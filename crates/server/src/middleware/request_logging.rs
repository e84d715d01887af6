use crate::AppState;
use axum::extract::State;
use axum::{extract::Request, middleware::Next, response::Response};
use keymeter_core::context::RequestContext;

/// Logs each request with its context and feeds the latency/status metrics.
/// The query string is never logged: it carries the caller's API key.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let ctx = request.extensions().get::<RequestContext>().cloned();
    let request_id = ctx
        .as_ref()
        .map(|c| c.request_id.clone())
        .unwrap_or_default();
    let client_ip = ctx
        .as_ref()
        .and_then(|c| c.client_ip.clone())
        .unwrap_or_else(|| "-".to_string());

    tracing::info!(
        request_id = %request_id,
        client_ip = %client_ip,
        method = %method,
        path = %path,
        "Request received"
    );

    let response = next.run(request).await;

    let elapsed = ctx.as_ref().map(|c| c.elapsed_ms()).unwrap_or(0);
    let status = response.status().as_u16();
    state.metrics.record_response(status, elapsed);

    if status >= 500 {
        tracing::warn!(request_id = %request_id, status, elapsed_ms = elapsed as u64, "Request failed");
    } else {
        tracing::info!(request_id = %request_id, status, elapsed_ms = elapsed as u64, "Request completed");
    }

    response
}
