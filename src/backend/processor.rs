//! Per-request response processor.
//!
//! A processor is created for exactly one native request and completes a
//! one-shot channel exactly once. The transport may call it from any
//! thread; the first event wins and later events are logged and dropped.

use std::sync::Mutex;
use std::time::SystemTime;
use tokio::sync::oneshot;
use url::Url;

use super::adapter::{ContentType, NativeResponse, NativeStatus};
use super::outcome::ResourceOutcome;
use crate::rdf::{self, far_future_expiry};

#[derive(Debug)]
pub struct ResponseProcessor {
    resource: Url,
    completion: Mutex<Option<oneshot::Sender<ResourceOutcome>>>,
}

impl ResponseProcessor {
    /// Create a processor together with the receiver its outcome goes to.
    pub fn new(resource: Url) -> (Self, oneshot::Receiver<ResourceOutcome>) {
        let (tx, rx) = oneshot::channel();
        let processor = Self {
            resource,
            completion: Mutex::new(Some(tx)),
        };
        (processor, rx)
    }

    pub fn resource(&self) -> &Url {
        &self.resource
    }

    pub fn is_completed(&self) -> bool {
        self.completion
            .lock()
            .map(|completion| completion.is_none())
            .unwrap_or(true)
    }

    /// Native response arrived. Returns whether this call completed the
    /// processor.
    pub fn on_native_response<R: NativeResponse>(&self, response: &R) -> bool {
        self.complete(normalize_response(&self.resource, response), "response")
    }

    /// The transport gave up waiting. Never retried here.
    pub fn on_timeout(&self) -> bool {
        self.complete(ResourceOutcome::timeout(&self.resource), "timeout")
    }

    /// The origin rejected the request at the transport level.
    pub fn on_reset(&self) -> bool {
        self.complete(ResourceOutcome::reset(&self.resource), "reset")
    }

    /// Complete with an outcome decided outside the transport, e.g. after a
    /// hard send failure.
    pub fn fail(&self, outcome: ResourceOutcome) -> bool {
        self.complete(outcome, "failure")
    }

    fn complete(&self, outcome: ResourceOutcome, event: &'static str) -> bool {
        let sender = self
            .completion
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(sender) = sender else {
            tracing::error!(
                resource = %self.resource,
                event,
                outcome = outcome.kind(),
                "Response processor already completed, ignoring event"
            );
            return false;
        };

        tracing::debug!(resource = %self.resource, event, outcome = outcome.kind(), "Completing response processor");
        if sender.send(outcome).is_err() {
            tracing::debug!(resource = %self.resource, "Requester went away before completion");
        }
        true
    }
}

/// Map a native response to a [`ResourceOutcome`].
///
/// Shared by request/response exchanges and observation updates.
pub fn normalize_response<R: NativeResponse>(resource: &Url, response: &R) -> ResourceOutcome {
    let success_status = match response.status() {
        NativeStatus::Error(status) => {
            let mut message = format!("{} answered {}.", resource, response.describe_status());
            if let Ok(diagnostic) = std::str::from_utf8(response.payload()) {
                let diagnostic = diagnostic.trim();
                if !diagnostic.is_empty() {
                    message.push(' ');
                    message.push_str(diagnostic);
                }
            }
            return ResourceOutcome::ApplicationError {
                resource: resource.clone(),
                status,
                message,
            };
        }
        NativeStatus::Success(status) => status,
    };

    let payload = response.payload();
    let language = match (response.content_type(), payload.is_empty()) {
        (ContentType::Absent, false) => {
            return ResourceOutcome::malformed(
                resource,
                format!("Response from {resource} had no content type option."),
            );
        }
        (ContentType::Absent, true) => {
            return ResourceOutcome::SuccessNoContent {
                status: success_status,
            };
        }
        (_, true) => {
            return ResourceOutcome::malformed(
                resource,
                format!("Response from {resource} had content type option but no content."),
            );
        }
        (ContentType::Unsupported(content_type), false) => {
            return ResourceOutcome::malformed(
                resource,
                format!("Response from {resource} had unsupported content type {content_type}."),
            );
        }
        (ContentType::Rdf(language), false) => language,
    };

    match rdf::parse_graph(payload, language, Some(resource.as_str())) {
        Ok(graph) => {
            let expiry = response
                .max_age()
                .map(|max_age| SystemTime::now() + max_age)
                .unwrap_or_else(far_future_expiry);
            ResourceOutcome::Success { graph, expiry }
        }
        Err(e) => ResourceOutcome::malformed(resource, format!("Response from {resource} could not be parsed: {e}")),
    }
}
