//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lostfound_core::{AuthError, ErrorKind};
use serde_json::json;
use thiserror::Error;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] lostfound_core::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Core(err.into())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::BadRequest(format!("malformed multipart body: {err}"))
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::Core(err) => match err.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation_error"),
                ErrorKind::Auth => (StatusCode::UNAUTHORIZED, "authentication_error"),
                ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "authorization_error"),
                ErrorKind::Upstream => (StatusCode::INTERNAL_SERVER_ERROR, "upstream_error"),
                ErrorKind::Store => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use lostfound_core::{BlobError, Error};

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(Error::Validation("x".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(AuthError::MissingCredentials), StatusCode::UNAUTHORIZED),
            (ApiError::from(Error::Forbidden("x".into())), StatusCode::FORBIDDEN),
            (
                ApiError::from(Error::from(BlobError::Backend("x".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::from(Error::NotFound("x".into())), StatusCode::NOT_FOUND),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
