//! HTTP response types and error mapping
//!
//! Every endpoint answers with an [`ApiResponse`] envelope; errors become the
//! same envelope with `success: false` and a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, ServiceError, WebError};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Status code and client-facing message for an error.
pub fn error_status(error: &AppError) -> (StatusCode, String) {
    match error {
        AppError::NotFound { resource, id } => (
            StatusCode::NOT_FOUND,
            format!("{} '{}' not found", resource, id),
        ),
        AppError::Service(e @ ServiceError::InvalidSpec { .. }) => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        AppError::Service(e @ ServiceError::UnknownWorker { .. }) => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        AppError::Web(e @ WebError::InvalidRequest { .. }) => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        AppError::Web(WebError::InvalidAuth { message }) => {
            (StatusCode::UNAUTHORIZED, message.clone())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = error_status(&self);
        debug!("Request rejected with {}: {}", status, self);

        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&AppError::not_found("service", "cpu")).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&ServiceError::invalid_spec("cpu", "zero").into()).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&WebError::invalid_auth("missing key").into()).0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            error_status(&WebError::invalid_request("name", "must not be empty").into()).0,
            StatusCode::BAD_REQUEST
        );
    }
}
