//! HTTP middleware

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::AppState;
use crate::errors::{AppError, WebError};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Key presented by the client, from `x-api-key` or a bearer token.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key.trim());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Reject requests without the configured API key. A no-op when
/// `web.api_key` is unset.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.web.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let rejection = match presented_key(request.headers()) {
        Some(key) if key == expected => None,
        Some(_) => Some("invalid API key"),
        None => Some("missing API key"),
    };

    match rejection {
        None => Ok(next.run(request).await),
        Some(message) => {
            debug!("Rejected request to {}: {}", request.uri(), message);
            Err(WebError::invalid_auth(message).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_presented_key_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        assert_eq!(presented_key(&headers), Some("secret"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("other"));
        assert_eq!(presented_key(&headers), Some("other"));
    }
}
