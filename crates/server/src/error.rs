// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(crate::jobs::JobId),

    #[error("Import is disabled")]
    ImportDisabled,

    #[error("File too large: {size} bytes (maximum {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Export file not found: {0}")]
    ArtifactMissing(std::path::PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (StatusCode::NOT_FOUND, ErrorResponse::new("Job not found"))
            }
            ApiError::ImportDisabled => {
                tracing::warn!("Rejected import request: import is disabled");
                (
                    StatusCode::FORBIDDEN,
                    ErrorResponse::with_details(
                        "Import is disabled",
                        "Set STEVEDORE_ENABLE_IMPORT=true to allow imports",
                    ),
                )
            }
            ApiError::PayloadTooLarge { size, max } => {
                tracing::warn!(size, max, "Rejected oversize archive");
                (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorResponse::with_details(
                        "File too large",
                        format!(
                            "Maximum allowed size: {}MB, received: {}MB",
                            max / 1024 / 1024,
                            size / 1024 / 1024
                        ),
                    ),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, "Conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("Conflict", msg.clone()),
                )
            }
            ApiError::ArtifactMissing(path) => {
                tracing::error!(path = %path.display(), "Export artifact missing");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::new("Export file not found"),
                )
            }
            ApiError::Io(e) => {
                tracing::error!(error = %e, "IO error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    /// Helper to extract status code and body from a response
    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_job_not_found_returns_404_with_exact_body() {
        let error = ApiError::JobNotFound(uuid::Uuid::new_v4());
        let response = error.into_response();
        let (status, body) = extract_response(response).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Job not found");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_import_disabled_returns_403() {
        let (status, body) = extract_response(ApiError::ImportDisabled.into_response()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error, "Import is disabled");
    }

    #[tokio::test]
    async fn test_payload_too_large_returns_413() {
        let error = ApiError::PayloadTooLarge {
            size: 3 * 1024 * 1024 * 1024,
            max: 2 * 1024 * 1024 * 1024,
        };
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body.error, "File too large");
        let details = body.details.unwrap();
        assert!(details.contains("2048MB"));
        assert!(details.contains("3072MB"));
    }

    #[tokio::test]
    async fn test_bad_request_returns_400() {
        let error = ApiError::BadRequest("Missing uploaded archive file".to_string());
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Bad request");
        assert!(body.details.unwrap().contains("archive"));
    }

    #[tokio::test]
    async fn test_conflict_returns_409() {
        let error = ApiError::Conflict("Job is not completed".to_string());
        let (status, _) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let error = ApiError::Internal("secret path /var/x leaked".to_string());
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Internal server error");
        // Internal errors should NOT expose details to clients
        assert!(body.details.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse::new("Job not found");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, "{\"error\":\"Job not found\"}");
    }
}
