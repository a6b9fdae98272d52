//! Error taxonomy for the REST layer.
//!
//! Every failure is rendered as JSON with at least a `message` field. Internal
//! detail (database errors, panics) rides along as a response extension and is
//! only written into the body by [`render_error_detail`] in development.

use std::any::Any;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::config::Environment;
use crate::models::MessageResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Unknown user or wrong password; the two are never distinguished.
    #[error("Wrong User")]
    WrongCredentials,

    #[error("No token provided")]
    MissingToken,

    /// Bad signature, expired or malformed token.
    #[error("Unauthorized")]
    InvalidToken,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Message and diagnostic attached to error responses, consumed by
/// [`render_error_detail`].
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub message: String,
    pub detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::WrongCredentials | ApiError::MissingToken | ApiError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Database(_) => "Database error".to_string(),
            ApiError::Internal(_) => "Something went wrong!".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.public_message();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let detail = match &self {
            ApiError::Database(_) | ApiError::Internal(_) => Some(self.to_string()),
            _ => None,
        };

        let mut response = (status, Json(MessageResponse::new(message.clone()))).into_response();
        if let Some(detail) = detail {
            response
                .extensions_mut()
                .insert(ErrorDetail { message, detail });
        }
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// Response mapper: in development, rewrite 5xx bodies to include `error`.
pub async fn render_error_detail(
    State(environment): State<Environment>,
    response: Response,
) -> Response {
    if !environment.is_development() {
        return response;
    }
    let Some(detail) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };
    let status = response.status();
    (
        status,
        Json(json!({ "message": detail.message, "error": detail.detail })),
    )
        .into_response()
}

/// Handler for `CatchPanicLayer`: panics become a masked 500.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal(detail).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::WrongCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound("Test").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_not_in_message() {
        let response = ApiError::Database(sqlx::Error::PoolTimedOut).into_response();
        let detail = response.extensions().get::<ErrorDetail>().unwrap();
        assert_eq!(detail.message, "Database error");
        assert!(detail.detail.contains("pool timed out"));

        let response = ApiError::NotFound("Project").into_response();
        assert!(response.extensions().get::<ErrorDetail>().is_none());
    }

    #[test]
    fn test_panic_payload_is_captured() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<ErrorDetail>().unwrap();
        assert_eq!(detail.message, "Something went wrong!");
        assert!(detail.detail.contains("boom"));
    }
}
