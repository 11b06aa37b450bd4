use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasklane_common::EngineError;

/// Structured error body returned by every failing route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, code: &str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                code: Some(code.to_string()),
                timestamp: Utc::now(),
            },
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail, "UNAUTHENTICATED")
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, detail, "FORBIDDEN")
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::Validation(detail) => {
                Self::new(StatusCode::BAD_REQUEST, detail.clone(), "VALIDATION_FAILED")
            }
            EngineError::Authorization(detail) => {
                Self::new(StatusCode::FORBIDDEN, detail.clone(), "FORBIDDEN")
            }
            // Never reveal whether the task exists under another owner.
            EngineError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "task not found", "TASK_NOT_FOUND")
            }
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "INTERNAL_ERROR",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_hides_the_task_identifier() {
        let api: ApiError = EngineError::NotFound("deadbeef".to_string()).into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert!(!api.body.error.contains("deadbeef"));
    }

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        let cases = [
            (EngineError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (EngineError::Authorization("no".into()), StatusCode::FORBIDDEN),
            (EngineError::Database("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
        }
    }
}
