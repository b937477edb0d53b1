//! Error response formatting
//!
//! Every handler error leaves the service as the same JSON envelope with a
//! machine-readable code, a user-facing message and the request id.

use crate::error::{AppError, AppErrorKind, ErrorCode, ValidationError};
use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    pub request_id: Option<String>,

    /// RFC 3339 timestamp of the error
    pub timestamp: String,

    /// Whether the client may retry the same request
    pub retryable: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        let details = match &error.kind {
            AppErrorKind::Validation(ValidationError::MissingField { field }) => {
                Some(serde_json::json!({ "field": field }))
            }
            AppErrorKind::Validation(ValidationError::InvalidField { field, reason }) => {
                Some(serde_json::json!({ "field": field, "error": reason }))
            }
            _ => None,
        };

        Self {
            code: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: error.is_retryable(),
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?self.error_code(),
                request_id = ?self.request_id,
                status = status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = %self,
                code = ?self.error_code(),
                request_id = ?self.request_id,
                status = status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Tag an error with the request id set by the request-id layer
pub fn with_request_id(error: AppError, headers: &HeaderMap) -> AppError {
    match get_request_id_from_headers(headers) {
        Some(id) if error.request_id.is_none() => error.with_request_id(id),
        _ => error,
    }
}

/// Body rejections use the same envelope as every other error
pub fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::invalid_field("body", rejection.body_text())
}
