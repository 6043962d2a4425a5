//! Error types for the axum transport.
//!
//! [`WebError`] is what a request turns into when it never reaches, or
//! fails inside, the context pipeline. It implements axum's `IntoResponse`
//! so every failure leaves as a JSON `{code, message}` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use http::Method;
use serde::Serialize;
use std::fmt;
use tether_core::{PipelineError, RegistryError};
use thiserror::Error;

/// Request-level error.
#[derive(Debug)]
pub struct WebError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl WebError {
    /// Create a new error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the internal cause.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400: the request could not be decoded.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 413: the body exceeds the transport limit.
    #[must_use]
    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            format!("request body exceeds {limit} bytes"),
        )
    }

    /// 422: a request part failed its schema.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    /// 500: the pipeline or the handler rejected.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for WebError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Validation failures are the caller's fault; everything else is ours.
impl From<PipelineError> for WebError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(invalid) => Self::validation(invalid.to_string()),
            other => Self::internal("An internal error occurred").with_source(other.into()),
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Errors raised while turning built routes into an axum router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The app itself could not be built
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// axum has no method filter for this method
    #[error("unsupported method {method} for {path}")]
    UnsupportedMethod {
        /// The method
        method: Method,
        /// The route path
        path: String,
    },

    /// Two routes share a path shape but name their parameters differently
    #[error("route {path} names its parameters differently from {existing}")]
    ParamMismatch {
        /// Path of the later registration
        path: String,
        /// Path of the earlier registration
        existing: String,
    },
}

/// Errors that stop [`serve`](crate::serve).
#[derive(Debug, Error)]
pub enum ServeError {
    /// Routes could not be mounted
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Binding or serving failed
    #[error("server I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{RequestPart, ValidationError};

    #[test]
    fn test_error_display() {
        let err = WebError::bad_request("Invalid JSON body");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid JSON body");
    }

    #[test]
    fn test_validation_maps_to_422() {
        let err = WebError::from(PipelineError::Validation(ValidationError::new(
            RequestPart::Body,
            "title is required",
        )));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_handler_rejection_maps_to_500_with_source() {
        let err = WebError::from(PipelineError::Handler(anyhow::anyhow!("db down")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.to_string().contains("db down"));
    }

    #[test]
    fn test_payload_too_large() {
        let err = WebError::payload_too_large(16);
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
