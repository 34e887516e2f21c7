//! Dispatch error taxonomy.
//!
//! Errors resolved at the dispatcher boundary. Back-end failures never use
//! this type; they travel as `ResourceOutcome` values.

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::backend::TranslationError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Method {0} is not allowed.")]
    MethodNotAllowed(Method),

    #[error("No service registered at {0}.")]
    OriginNotFound(String),

    /// Malformed proxy URI or query.
    #[error("{message}")]
    TranslationFailure { status: StatusCode, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        DispatchError::TranslationFailure {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        DispatchError::TranslationFailure {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::OriginNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::TranslationFailure { status, .. } => *status,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TranslationError> for DispatchError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::MethodNotAllowed(method) => DispatchError::MethodNotAllowed(method),
            other => DispatchError::bad_gateway(other.to_string()),
        }
    }
}
