//! Error taxonomy and HTTP mapping for the Service Engine core.
//!
//! `EngineError` is the single tagged error type returned from module
//! domain logic. The HTTP layer (see `engine-http`) is the sole place
//! that maps a variant to a status code; domain code never constructs
//! an HTTP response directly.

use std::fmt;

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// The stable machine-readable codes from the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorCode {
    NotFound,
    InvalidArgument,
    Unauthorized,
    PermissionDenied,
    Conflict,
    InsufficientFunds,
    #[serde(rename = "TTLExpired")]
    TtlExpired,
    AttemptsExhausted,
    DependencyUnavailable,
    ConfigInvalid,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "NotFound",
            Self::InvalidArgument => "InvalidArgument",
            Self::Unauthorized => "Unauthorized",
            Self::PermissionDenied => "PermissionDenied",
            Self::Conflict => "Conflict",
            Self::InsufficientFunds => "InsufficientFunds",
            Self::TtlExpired => "TTLExpired",
            Self::AttemptsExhausted => "AttemptsExhausted",
            Self::DependencyUnavailable => "DependencyUnavailable",
            Self::ConfigInvalid => "ConfigInvalid",
            Self::Internal => "Internal",
        };
        f.write_str(s)
    }
}

/// The tagged error variant every domain service returns.
///
/// Retryable vs. terminal is a property of the variant, not of the
/// eventual HTTP status: callers should match on this enum rather than
/// on `status()`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("resource not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("permission denied")]
    PermissionDenied,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("request TTL expired")]
    TtlExpired,

    #[error("retry attempts exhausted")]
    AttemptsExhausted,

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl EngineError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound => ErrorCode::NotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::PermissionDenied => ErrorCode::PermissionDenied,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::InsufficientFunds => ErrorCode::InsufficientFunds,
            Self::TtlExpired => ErrorCode::TtlExpired,
            Self::AttemptsExhausted => ErrorCode::AttemptsExhausted,
            Self::DependencyUnavailable(_) => ErrorCode::DependencyUnavailable,
            Self::ConfigInvalid(_) => ErrorCode::ConfigInvalid,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::TtlExpired | Self::AttemptsExhausted => StatusCode::NOT_FOUND,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            Self::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConfigInvalid(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the dispatcher should treat this error as retryable.
    ///
    /// This is independent of the HTTP status: `DependencyUnavailable`
    /// surfaces as a 503 but is retryable, while `InvalidArgument`
    /// surfaces as a 400 and is terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DependencyUnavailable(_) | Self::Internal(_))
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// The `{error: {code, message, details?}}` envelope from the spec.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EngineError {
    /// Render the caller-visible message: internal errors never expose
    /// their cause, only a stable generic message.
    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        } else {
            tracing::debug!(error = %self, code = %self.code(), "request failed");
        }

        let status = self.status();
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code(),
                message: self.public_message(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(EngineError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(EngineError::NotFound.code(), ErrorCode::NotFound);
    }

    #[test]
    fn insufficient_funds_maps_to_402() {
        assert_eq!(
            EngineError::InsufficientFunds.status(),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn dependency_unavailable_is_retryable_but_503() {
        let err = EngineError::DependencyUnavailable("store".to_owned());
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_argument_is_terminal() {
        let err = EngineError::InvalidArgument("bad".to_owned());
        assert!(!err.is_retryable());
    }

    #[test]
    fn internal_error_hides_cause_in_public_message() {
        let err = EngineError::internal(anyhow::anyhow!("postgres connection reset by peer"));
        assert_eq!(err.public_message(), "an internal error occurred");
    }

    #[test]
    fn error_code_serializes_pascal_case_with_ttl_override() {
        let json = serde_json::to_string(&ErrorCode::TtlExpired).unwrap();
        assert_eq!(json, "\"TTLExpired\"");
        let json = serde_json::to_string(&ErrorCode::NotFound).unwrap();
        assert_eq!(json, "\"NotFound\"");
    }
}
