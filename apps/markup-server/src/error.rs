//! Error types for the markup server

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use markup_core::MarkupError;
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("PDF error: {0}")]
    PdfError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ServerError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            ServerError::DocumentNotFound(name) => (
                StatusCode::NOT_FOUND,
                "DOCUMENT_NOT_FOUND",
                format!("Document '{}' not found", name),
            ),
            ServerError::PdfError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PDF_ERROR", msg.clone())
            }
            ServerError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<MarkupError> for ServerError {
    fn from(err: MarkupError) -> Self {
        match err {
            MarkupError::InvalidRequest(msg) => ServerError::InvalidRequest(msg),
            other => ServerError::PdfError(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("Worker task failed: {}", err))
    }
}
