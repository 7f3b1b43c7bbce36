//! The single error → HTTP response mapping for the gatekeeper API.
//!
//! Mirrors the teacher's `common::auth::errors::AuthError` shape (a
//! `thiserror` enum with `#[from]` conversions for the errors that
//! naturally bubble up) but extended to cover the full stable-code
//! taxonomy from spec §6/§7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid api key")]
    InvalidApiKey,

    #[error("insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("constraint violation: {constraint}")]
    ConstraintViolation {
        constraint: String,
        message: String,
    },

    #[error("request not found")]
    RequestNotFound,

    #[error("already resolved: {0}")]
    AlreadyResolved(String),

    #[error("request expired")]
    RequestExpired,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("token already consumed")]
    TokenConsumed,

    #[error("approval denied")]
    ApprovalDenied,

    #[error("calendar provider error: {0}")]
    CalendarProviderError(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Stable machine-readable code from spec §6's error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidApiKey => "INVALID_API_KEY",
            AppError::InsufficientPermissions(_) => "INSUFFICIENT_PERMISSIONS",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            AppError::RequestNotFound => "REQUEST_NOT_FOUND",
            AppError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            AppError::RequestExpired => "REQUEST_EXPIRED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::TokenConsumed => "TOKEN_CONSUMED",
            AppError::ApprovalDenied => "APPROVAL_DENIED",
            AppError::CalendarProviderError(_) => "GOOGLE_API_ERROR",
            AppError::Internal(_) | AppError::Database(_) => "INTERNAL_ERROR",
        }
    }

    /// The status code this error maps to, exposed for callers (like the
    /// HTML callback views) that render their own body instead of going
    /// through `IntoResponse`.
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AppError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ConstraintViolation { .. } => StatusCode::FORBIDDEN,
            AppError::RequestNotFound => StatusCode::NOT_FOUND,
            AppError::AlreadyResolved(_) => StatusCode::CONFLICT,
            AppError::RequestExpired => StatusCode::GONE,
            AppError::InvalidToken => StatusCode::BAD_REQUEST,
            AppError::TokenExpired => StatusCode::GONE,
            AppError::TokenConsumed => StatusCode::CONFLICT,
            AppError::ApprovalDenied => StatusCode::OK,
            AppError::CalendarProviderError(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log at the severity spec §7 assigns to this error's category.
    /// Client-input and authz errors never log above debug; internal
    /// errors always log at error with the full chain.
    fn log(&self) {
        match self {
            AppError::Validation(_)
            | AppError::ConstraintViolation { .. }
            | AppError::InvalidToken
            | AppError::TokenExpired
            | AppError::TokenConsumed
            | AppError::RequestNotFound
            | AppError::AlreadyResolved(_)
            | AppError::RequestExpired
            | AppError::ApprovalDenied => {
                tracing::debug!(code = self.code(), "client-input error");
            }
            AppError::InvalidApiKey
            | AppError::InsufficientPermissions(_)
            | AppError::RateLimited { .. } => {
                tracing::debug!(code = self.code(), "authz/rate-limit error");
            }
            AppError::CalendarProviderError(msg) => {
                tracing::warn!(code = self.code(), %msg, "upstream calendar error surfaced");
            }
            AppError::Internal(e) => {
                tracing::error!(code = self.code(), error = %e, "internal error");
            }
            AppError::Database(e) => {
                tracing::error!(code = self.code(), error = %e, "database error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.http_status();
        let code = self.code();
        let message = match &self {
            // Internal details are never surfaced to the client.
            AppError::Internal(_) | AppError::Database(_) => {
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });

        if let AppError::ConstraintViolation { constraint, .. } = &self {
            body["error"]["details"] = json!({ "constraint": constraint });
        }
        if let AppError::RateLimited { retry_after_secs } = &self {
            body["error"]["details"] = json!({ "retry_after_secs": retry_after_secs });
        }

        let mut response = (status, Json(body)).into_response();
        if let AppError::RateLimited { retry_after_secs } = &self {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_str(&retry_after_secs.to_string()).unwrap(),
            );
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;
