//! Error types for the bridge

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("App client connection lost: {0}")]
    ConnectionLost(String),

    #[error("No response to request {id} after {after_ms} ms")]
    Timeout { id: String, after_ms: u64 },

    #[error("Request id {0} is already pending")]
    DuplicateRequest(String),

    #[error("App client reported an error: {0}")]
    App(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid screenshot name: {0}")]
    InvalidName(String),

    #[error("Bridge is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    fn status(&self) -> StatusCode {
        match self {
            BridgeError::ConnectionLost(_) | BridgeError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::DuplicateRequest(_) => StatusCode::CONFLICT,
            BridgeError::App(_) | BridgeError::Protocol(_) => StatusCode::BAD_GATEWAY,
            BridgeError::InvalidName(_) => StatusCode::BAD_REQUEST,
            BridgeError::Io(_) | BridgeError::Json(_) | BridgeError::Image(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

impl From<BridgeError> for owl_common::Error {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Io(e) => owl_common::Error::Io(e),
            BridgeError::Json(e) => owl_common::Error::Json(e),
            other => owl_common::Error::BridgeConnectionLost(other.to_string()),
        }
    }
}
