use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::domain::{ErrorKind, ErrorRecord};
use crate::supervisor::SupervisorError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", .0.message)]
    Validation(ErrorRecord),
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("job cannot be cancelled: {0}")]
    Conflict(String),
    #[error("provider error: {0}")]
    Upstream { kind: ErrorKind, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream { kind, .. } => status_for_kind(*kind),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_FAILED",
            ApiError::RateLimited(_) => "RATE_LIMITED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Upstream { kind, .. } => code_for_kind(*kind),
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Maps the fixed error taxonomy onto HTTP status codes for whenever an
/// `ErrorRecord` needs to be surfaced synchronously rather than through the
/// job's `error` field.
fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
        ErrorKind::ServerError | ErrorKind::Network => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::MissingData => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Cancelled => StatusCode::CONFLICT,
        ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn code_for_kind(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::QuotaExceeded => "quota_exceeded",
        ErrorKind::Timeout => "timeout",
        ErrorKind::Authentication => "authentication",
        ErrorKind::ServerError => "server_error",
        ErrorKind::Network => "network",
        ErrorKind::MissingData => "missing_data",
        ErrorKind::Cancelled => "cancelled",
        ErrorKind::Unknown => "unknown",
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.into())
    }
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Validation(inner) => ApiError::Validation(inner.into()),
            SupervisorError::ForceNewRateLimited { .. } => ApiError::RateLimited(err.to_string()),
            SupervisorError::JobNotFound(id) => ApiError::NotFound(id),
            SupervisorError::AlreadyTerminal(id) => ApiError::Conflict(id),
            SupervisorError::Ledger(inner) => ApiError::Internal(inner.to_string()),
            SupervisorError::Queue(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let (category, details, user_action) = match &self {
            ApiError::Validation(record) => {
                (record.category.clone(), record.details.clone(), record.user_action.clone())
            }
            _ => (None, None, None),
        };
        let body = ErrorResponse { code: self.code(), message: self.to_string(), category, details, user_action };
        (status, Json(body)).into_response()
    }
}
