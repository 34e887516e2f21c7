//! Capability trait implemented by every back-end protocol.
//!
//! An adapter knows how to build its native request from a proxy request,
//! how to put it on the wire, and how to read status, payload and content
//! type from its native responses. Everything else (single-fire completion,
//! outcome normalization, observation bookkeeping) is shared and lives in
//! `processor.rs` and `gateway.rs`.

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::outcome::ResourceOutcome;
use super::processor::ResponseProcessor;
use crate::dispatch::ProxyRequest;
use crate::rdf::Language;

/// Status of a native response, already mapped to HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeStatus {
    Success(StatusCode),
    Error(StatusCode),
}

/// Content type declared by a native response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    Absent,
    Rdf(Language),
    /// Declared, but not an RDF language the proxy can parse.
    Unsupported(String),
}

pub trait NativeRequest: fmt::Debug + Send + 'static {
    /// Origin URI the request is addressed to.
    fn target(&self) -> &Url;
}

pub trait NativeResponse: fmt::Debug {
    /// Status mapped through the protocol's total error table.
    fn status(&self) -> NativeStatus;

    /// Human readable native status, e.g. `4.04 Not Found`.
    fn describe_status(&self) -> String;

    fn payload(&self) -> &[u8];

    fn content_type(&self) -> ContentType;

    /// Freshness lifetime, when the origin declared one.
    fn max_age(&self) -> Option<Duration>;
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Method {0} is not allowed.")]
    MethodNotAllowed(Method),

    #[error("Invalid origin URI {uri}: {reason}")]
    InvalidTarget { uri: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("could not resolve {host}: {reason}")]
    Unresolvable { host: String, reason: String },

    #[error("destination {0} is not reachable from the local endpoint")]
    Unreachable(std::net::SocketAddr),

    #[error("could not encode request: {0}")]
    Encode(String),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport is shut down")]
    Closed,

    #[error("observation is not supported by this back-end")]
    ObservationUnsupported,
}

/// Receiver of push updates for an observed resource.
pub trait ObservationSink: Send + Sync + 'static {
    /// Called for every fresh update, normalized like a regular response.
    fn on_update(&self, outcome: ResourceOutcome);

    /// Called once when the origin or the transport ends the observation.
    fn on_closed(&self) {}
}

/// Adapter-specific cancellation of one observation.
pub struct ObservationHandle {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ObservationHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Cancel the observation. Only the first call has an effect.
    pub fn cancel(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel
            .lock()
            .map(|cancel| cancel.is_some())
            .unwrap_or(false)
    }
}

impl fmt::Debug for ObservationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

#[async_trait]
pub trait ProtocolAdapter: Send + Sync + 'static {
    type Request: NativeRequest;

    /// URI scheme of the origins this adapter talks to.
    fn scheme(&self) -> &'static str;

    /// Build the native request for `origin`. Pure, no I/O.
    fn translate(&self, request: &ProxyRequest, origin: &Url) -> Result<Self::Request, TranslationError>;

    /// Put the request on the wire. The processor is completed by the
    /// transport later; an `Err` means nothing was sent.
    async fn transmit(
        &self,
        request: Self::Request,
        processor: Arc<ResponseProcessor>,
    ) -> Result<(), TransmitError>;

    fn supports_observation(&self) -> bool {
        false
    }

    async fn observe(
        &self,
        origin: &Url,
        sink: Arc<dyn ObservationSink>,
    ) -> Result<ObservationHandle, TransmitError> {
        let _ = (origin, sink);
        Err(TransmitError::ObservationUnsupported)
    }

    /// Release sockets and complete every in-flight request.
    async fn shutdown(&self);
}
