use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use perfreport::{QueueError, ReportError};
use serde::{Deserialize, Serialize};

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Payload too large: max {0}KB allowed")]
    PayloadTooLarge(usize),

    #[error("Index queue is closed")]
    QueueClosed,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Not found")]
    NotFound,
}

/// API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            ServerError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ServerError::QueueClosed => "QUEUE_CLOSED",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::NotFound => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        });

        (status, body).into_response()
    }
}

impl From<ReportError> for ServerError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::MalformedPayload(msg) => ServerError::MalformedPayload(msg),
            ReportError::Encode(msg) => ServerError::Internal(msg),
        }
    }
}

impl From<QueueError> for ServerError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Closed => ServerError::QueueClosed,
            QueueError::ZeroCapacity => ServerError::Internal(err.to_string()),
        }
    }
}
