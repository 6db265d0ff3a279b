/// Unified error types for linkgate
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the access control server
#[derive(Error, Debug)]
pub enum GateError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Validation errors (malformed email/phone/missing fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// No session and no matching device binding
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    /// Bound token or session seen from a different IP or fingerprint
    #[error("Device mismatch: {0}")]
    DeviceMismatch(String),

    /// Authorization errors (admin-only routes, primary admin rules)
    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Not found errors (unknown token / user)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: std::time::Duration },

    /// Email delivery failures (hard failure for access links)
    #[error("Mail error: {0}")]
    Mail(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Hint for clients: route to the request-access flow, not a login form
    #[serde(rename = "requiresToken", skip_serializing_if = "Option::is_none")]
    pub requires_token: Option<bool>,
    /// Seconds until the caller may retry (rate limiting)
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Convert GateError to HTTP response
impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let mut requires_token = None;
        let mut retry_after = None;

        let (status, error_code, message) = match &self {
            GateError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            GateError::Unauthenticated(_) => {
                requires_token = Some(true);
                (
                    StatusCode::UNAUTHORIZED,
                    "AuthenticationRequired",
                    self.to_string(),
                )
            }
            GateError::DeviceMismatch(_) => (
                StatusCode::FORBIDDEN,
                "DeviceMismatch",
                self.to_string(),
            ),
            GateError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                "Forbidden",
                self.to_string(),
            ),
            GateError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            GateError::RateLimited { retry_after: wait } => {
                retry_after = Some(wait.as_secs().max(1));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RateLimitExceeded",
                    "Rate limit exceeded".to_string(),
                )
            }
            GateError::Database(_) | GateError::Internal(_) | GateError::Io(_) => {
                tracing::error!("Internal error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(), // Don't leak details
                )
            }
            GateError::Mail(_) => {
                tracing::error!("Mail delivery failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MailDeliveryFailed",
                    "Failed to send access email".to_string(),
                )
            }
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: error_code.to_string(),
                message,
                requires_token,
                retry_after,
            }),
        )
            .into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

/// Result type alias for linkgate operations
pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GateError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                GateError::Unauthenticated("no session".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                GateError::DeviceMismatch("wrong device".into()),
                StatusCode::FORBIDDEN,
            ),
            (GateError::NotFound("token".into()), StatusCode::NOT_FOUND),
            (
                GateError::RateLimited {
                    retry_after: std::time::Duration::from_secs(30),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                GateError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after_header() {
        let err = GateError::RateLimited {
            retry_after: std::time::Duration::from_secs(42),
        };
        let response = err.into_response();
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
    }

    #[test]
    fn test_internal_error_is_sanitized() {
        let err = GateError::Internal("secret connection string".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
