//! Normalized result of one back-end interaction.

use axum::http::StatusCode;
use oxigraph::model::Graph;
use std::time::SystemTime;
use url::Url;

/// Outcome of a request to a data origin, independent of its protocol.
///
/// Produced once per native request and never modified afterwards.
#[derive(Debug, Clone)]
pub enum ResourceOutcome {
    /// Non-empty payload with a recognized content type.
    Success { graph: Graph, expiry: SystemTime },

    /// Successful operation without a body.
    SuccessNoContent { status: StatusCode },

    /// The origin answered with an error code.
    ApplicationError {
        resource: Url,
        status: StatusCode,
        message: String,
    },

    /// No answer within the transport's retransmission budget. Always 504.
    TransportTimeout { resource: Url, message: String },

    /// The origin broke the payload / content type contract. Always 500.
    MalformedResponse { resource: Url, message: String },
}

impl ResourceOutcome {
    pub fn timeout(resource: &Url) -> Self {
        ResourceOutcome::TransportTimeout {
            resource: resource.clone(),
            message: format!("No response received from {resource}."),
        }
    }

    pub fn reset(resource: &Url) -> Self {
        ResourceOutcome::TransportTimeout {
            resource: resource.clone(),
            message: format!("Request to {resource} was reset by the origin."),
        }
    }

    pub fn malformed(resource: &Url, message: impl Into<String>) -> Self {
        ResourceOutcome::MalformedResponse {
            resource: resource.clone(),
            message: message.into(),
        }
    }

    /// HTTP status this outcome renders as.
    pub fn status(&self) -> StatusCode {
        match self {
            ResourceOutcome::Success { .. } => StatusCode::OK,
            ResourceOutcome::SuccessNoContent { status } => *status,
            ResourceOutcome::ApplicationError { status, .. } => *status,
            ResourceOutcome::TransportTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ResourceOutcome::MalformedResponse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Diagnostic message of failed outcomes.
    pub fn message(&self) -> Option<&str> {
        match self {
            ResourceOutcome::ApplicationError { message, .. }
            | ResourceOutcome::TransportTimeout { message, .. }
            | ResourceOutcome::MalformedResponse { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceOutcome::Success { .. } => "success",
            ResourceOutcome::SuccessNoContent { .. } => "success_no_content",
            ResourceOutcome::ApplicationError { .. } => "application_error",
            ResourceOutcome::TransportTimeout { .. } => "transport_timeout",
            ResourceOutcome::MalformedResponse { .. } => "malformed_response",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ResourceOutcome::Success { .. } | ResourceOutcome::SuccessNoContent { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_statuses() {
        let resource = Url::parse("coap://[::1]/temp").unwrap();
        let timeout = ResourceOutcome::timeout(&resource);
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.message(), Some("No response received from coap://[::1]/temp."));

        let malformed = ResourceOutcome::malformed(&resource, "bad");
        assert_eq!(malformed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!malformed.is_success());
        assert_eq!(malformed.kind(), "malformed_response");
    }
}
