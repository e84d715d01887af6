//! Success envelope shared by all JSON endpoints. Errors render through
//! `UsageError`'s `IntoResponse` with the same `code`/`message` shape.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub message: &'static str,
    pub data: T,
}

/// 200 with `{"code": 0, "message": "success", "data": ...}`.
pub fn success<T: Serialize>(data: T) -> Response {
    with_status(StatusCode::OK, data)
}

/// 201 with the success envelope.
pub fn created<T: Serialize>(data: T) -> Response {
    with_status(StatusCode::CREATED, data)
}

fn with_status<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = Envelope {
        code: 0,
        message: "success",
        data,
    };
    (status, Json(body)).into_response()
}
