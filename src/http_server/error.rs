//! Defines the custom `ApiError` type for the HTTP server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::{engine::pipeline::PipelineError, persistence::error::PersistenceError};

/// A custom error type for the API that can be converted into an HTTP
/// response.
pub enum ApiError {
    /// The request failed signature verification.
    Unauthorized,

    /// The request payload is malformed.
    BadRequest(String),

    /// A resource that could not be found.
    NotFound(String),

    /// A conflict, e.g. a resource that already exists.
    Conflict(String),

    /// A generic internal server error.
    InternalServerError(String),
}

/// Converts a `PersistenceError` into an `ApiError`.
///
/// This allows for the convenient use of the `?` operator in handlers on
/// functions that return `Result<_, PersistenceError>`.
impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(message) => ApiError::NotFound(message),
            PersistenceError::AlreadyExists(message) => ApiError::Conflict(message),
            PersistenceError::InvalidInput(message) => ApiError::BadRequest(message),
            _ => ApiError::InternalServerError(err.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::MissingAlertId => ApiError::BadRequest(err.to_string()),
            PipelineError::UnknownAlertId(_) => ApiError::NotFound(err.to_string()),
            PipelineError::NormalizationFailed { .. } =>
                ApiError::InternalServerError(err.to_string()),
            PipelineError::Persistence(e) => e.into(),
        }
    }
}

/// Implements the conversion from `ApiError` into an `axum` response.
///
/// This is the central point for mapping internal application errors to
/// user-facing HTTP responses.
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::Unauthorized =>
                (StatusCode::UNAUTHORIZED, json!({ "error": "Invalid signature" })),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, json!({ "error": message })),
            ApiError::InternalServerError(err) => {
                tracing::error!("Internal server error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An internal server error occurred" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
