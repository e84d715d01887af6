use axum::http::HeaderMap;
use std::time::Instant;

/// Per-request metadata for logging and metrics.
/// Injected as an axum `Extension` by the request context middleware.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier (UUID v4), or the caller's `x-request-id`.
    pub request_id: String,
    pub start_time: Instant,
    pub client_ip: Option<String>,
}

impl RequestContext {
    pub fn new(client_ip: Option<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            start_time: Instant::now(),
            client_ip,
        }
    }

    /// Build a context from inbound headers, reusing a caller-supplied
    /// `x-request-id` when present.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut ctx = Self::new(client_ip(headers));
        if let Some(id) = header_str(headers, "x-request-id").filter(|id| !id.is_empty()) {
            ctx.request_id = id.to_string();
        }
        ctx
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }
}

/// First hop of `x-forwarded-for`, else `x-real-ip`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::to_string)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
