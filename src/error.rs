use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Typed internal errors. `main` and the long-running tasks still speak
/// `anyhow::Result` at their boundary, the way the teacher's
/// `run_otlp_server` / `run_http_server` do; this enum carries the
/// specifics that HTTP handlers need to turn into a status code.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("malformed segment payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("queue is closed")]
    QueueClosed,

    #[error("backend rejected the request: {0}")]
    BackendRejected(String),

    #[error("http error talking to backend: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Decode(_) => StatusCode::BAD_REQUEST,
            GatewayError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BackendRejected(_) | GatewayError::Http(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Bind(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, axum::Json(json!({"error": self.to_string()}))).into_response()
    }
}
