//! HTTP error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format for the
//! plain HTTP surface, mapping internal errors to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "unauthorized").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP error type that maps to status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 401 Unauthorized - no valid session cookie.
    Unauthorized(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlpilot_core::PilotError> for ApiError {
    fn from(err: sqlpilot_core::PilotError) -> Self {
        match &err {
            sqlpilot_core::PilotError::Session(msg) => ApiError::Unauthorized(msg.clone()),
            sqlpilot_core::PilotError::Config(msg) => ApiError::BadRequest(msg.clone()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unauthorized_maps_to_401_json() {
        let response = ApiError::Unauthorized("session required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "unauthorized");
        assert_eq!(body["message"], "session required");
    }

    #[tokio::test]
    async fn test_storage_error_maps_to_500() {
        let err = sqlpilot_core::PilotError::Storage("disk full".to_string());
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
