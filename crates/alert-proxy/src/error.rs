//! API-facing error taxonomy (spec.md §6/§7): one variant per documented
//! error code, each mapping to its documented HTTP status and error body
//! shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response as AxumResponse};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    UnsupportedMediaType,
    PayloadTooLarge,
    TimeoutError,
    RateLimitError,
    AuthenticationError,
    AuthorizationError,
    ServiceUnavailable,
    InternalError,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub details: Vec<ErrorDetail>,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("method not allowed")]
    MethodNotAllowed { request_id: String },
    #[error("unsupported media type")]
    UnsupportedMediaType { request_id: String },
    #[error("payload too large")]
    PayloadTooLarge { request_id: String },
    #[error("validation failed")]
    Validation {
        details: Vec<ErrorDetail>,
        request_id: String,
    },
    #[error("request deadline exceeded")]
    Timeout { request_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, request_id: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            ApiError::MethodNotAllowed { .. } => ErrorCode::ValidationError,
            ApiError::UnsupportedMediaType { .. } => ErrorCode::UnsupportedMediaType,
            ApiError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            ApiError::Validation { .. } => ErrorCode::ValidationError,
            ApiError::Timeout { .. } => ErrorCode::TimeoutError,
            ApiError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    fn details(&self) -> Vec<ErrorDetail> {
        match self {
            ApiError::Validation { details, .. } => details.clone(),
            _ => Vec::new(),
        }
    }

    fn request_id(&self) -> &str {
        match self {
            ApiError::MethodNotAllowed { request_id }
            | ApiError::UnsupportedMediaType { request_id }
            | ApiError::PayloadTooLarge { request_id }
            | ApiError::Validation { request_id, .. }
            | ApiError::Timeout { request_id }
            | ApiError::Internal { request_id, .. } => request_id,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> AxumResponse {
        let status = self.status();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
            timestamp: Utc::now(),
            request_id: self.request_id().to_string(),
        };
        (status, Json(serde_json::json!({ "error": body }))).into_response()
    }
}
