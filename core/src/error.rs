//! Error types for the context pipeline and the route registry.

use crate::schema::RequestPart;
use http::Method;
use thiserror::Error;

/// A request part failed the route's declared schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {part}: {message}")]
pub struct ValidationError {
    /// The part of the request that failed to parse
    pub part: RequestPart,
    /// Human-readable reason from the schema
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for `part`.
    #[must_use]
    pub fn new(part: RequestPart, message: impl Into<String>) -> Self {
        Self {
            part,
            message: message.into(),
        }
    }
}

/// Errors that escape the context pipeline.
///
/// None of these are recovered locally: the transport is responsible for
/// turning them into an error response.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A derive function rejected
    #[error("derive #{index} failed: {source}")]
    Derive {
        /// Registration index of the derive function
        index: usize,
        /// Error returned by the derive function
        #[source]
        source: anyhow::Error,
    },

    /// A resolve function rejected
    #[error("resolve #{index} failed: {source}")]
    Resolve {
        /// Registration index of the resolve function
        index: usize,
        /// Error returned by the resolve function
        #[source]
        source: anyhow::Error,
    },

    /// The route handler rejected
    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    /// A request part did not satisfy the route schema
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors raised while freezing an [`App`](crate::App) into routes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two routes share a method and a path shape
    #[error("route conflict: {method} {path} collides with {existing}")]
    RouteConflict {
        /// Method shared by both routes
        method: Method,
        /// Path of the later registration
        path: String,
        /// Path of the earlier registration
        existing: String,
    },

    /// A route path cannot be registered
    #[error("invalid route path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new(RequestPart::Body, "missing field `title`");
        assert_eq!(err.to_string(), "invalid body: missing field `title`");
    }

    #[test]
    fn test_conflict_display() {
        let err = RegistryError::RouteConflict {
            method: Method::GET,
            path: "/users/:name".to_string(),
            existing: "/users/:id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "route conflict: GET /users/:name collides with /users/:id"
        );
    }
}
