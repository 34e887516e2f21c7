//! Generic back-end gateway.
//!
//! # Responsibilities
//! - Own the single protocol client of a back-end (through its adapter)
//! - Attach one fresh `ResponseProcessor` to every outgoing request
//! - Fail fast when the transport cannot send at all
//! - Keep at most one observation per origin resource

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use url::Url;

use super::adapter::{
    NativeRequest, ObservationHandle, ObservationSink, ProtocolAdapter, TransmitError,
    TranslationError,
};
use super::outcome::ResourceOutcome;
use super::processor::ResponseProcessor;
use crate::dispatch::{DispatchError, ProxyRequest};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The transport dropped the processor without completing it.
    #[error("request to {0} was abandoned by the transport")]
    Abandoned(Url),

    #[error(transparent)]
    Transmit(#[from] TransmitError),
}

/// A live observation of one origin resource.
///
/// Clones share the same underlying subscription.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    resource: Url,
    handle: ObservationHandle,
}

impl Subscription {
    fn new(resource: Url, handle: ObservationHandle) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner { resource, handle }),
        }
    }

    pub fn resource(&self) -> &Url {
        &self.inner.resource
    }

    /// Whether both values refer to the same subscription.
    pub fn same_as(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_active(&self) -> bool {
        self.inner.handle.is_active()
    }

    fn cancel(&self) {
        self.inner.handle.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("resource", &self.inner.resource.as_str())
            .field("active", &self.is_active())
            .finish()
    }
}

type ObservationSlots = DashMap<Url, Arc<OnceCell<Subscription>>>;

/// Gateway over one protocol adapter.
pub struct BackendGateway<A: ProtocolAdapter> {
    adapter: A,
    observations: Arc<ObservationSlots>,
}

impl<A: ProtocolAdapter> BackendGateway<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            observations: Arc::new(DashMap::new()),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn translate(&self, request: &ProxyRequest, origin: &Url) -> Result<A::Request, TranslationError> {
        self.adapter.translate(request, origin)
    }

    /// Send a native request and wait for its outcome.
    ///
    /// The returned future always resolves: with the transport's outcome,
    /// with `MalformedResponse` when nothing could be sent, or with
    /// [`GatewayError::Abandoned`] if the transport lost the processor.
    pub async fn send(&self, request: A::Request) -> Result<ResourceOutcome, GatewayError> {
        let resource = request.target().clone();
        let (processor, completion) = ResponseProcessor::new(resource.clone());
        let processor = Arc::new(processor);

        if let Err(e) = self.adapter.transmit(request, Arc::clone(&processor)).await {
            tracing::warn!(resource = %resource, error = %e, "Could not send request to origin");
            processor.fail(ResourceOutcome::malformed(
                &resource,
                format!("Could not send request to {resource}: {e}"),
            ));
        }
        drop(processor);

        let outcome = completion
            .await
            .map_err(|_| GatewayError::Abandoned(resource))?;
        metrics::record_backend_outcome(outcome.kind());
        Ok(outcome)
    }

    /// Start observing `resource`, or return the existing subscription.
    pub async fn observe(
        &self,
        resource: &Url,
        sink: Arc<dyn ObservationSink>,
    ) -> Result<Subscription, GatewayError> {
        let slot = match self.observations.entry(resource.clone()) {
            Entry::Occupied(entry) => {
                tracing::info!(resource = %resource, "Already observing resource");
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(OnceCell::new())).value()),
        };

        let result = slot
            .get_or_try_init(|| async {
                let sink = Arc::new(SlotReleasingSink {
                    resource: resource.clone(),
                    slot: Arc::downgrade(&slot),
                    slots: Arc::downgrade(&self.observations),
                    inner: sink,
                });
                let handle = self.adapter.observe(resource, sink).await?;
                tracing::info!(resource = %resource, "Observing resource");
                Ok::<_, TransmitError>(Subscription::new(resource.clone(), handle))
            })
            .await;

        match result {
            Ok(subscription) => Ok(subscription.clone()),
            Err(e) => {
                self.observations
                    .remove_if(resource, |_, existing| Arc::ptr_eq(existing, &slot));
                Err(e.into())
            }
        }
    }

    /// Stop observing `resource`. Returns whether an observation existed.
    pub fn unobserve(&self, resource: &Url) -> bool {
        let Some((_, slot)) = self.observations.remove(resource) else {
            return false;
        };
        if let Some(subscription) = slot.get() {
            subscription.cancel();
        }
        tracing::info!(resource = %resource, "Stopped observing resource");
        true
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Cancel all observations and shut the transport down.
    pub async fn shutdown(&self) {
        let resources: Vec<Url> = self
            .observations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for resource in resources {
            self.unobserve(&resource);
        }
        self.adapter.shutdown().await;
    }
}

/// Frees the observation slot when the transport ends an observation, so
/// that the resource can be observed again later.
struct SlotReleasingSink {
    resource: Url,
    slot: std::sync::Weak<OnceCell<Subscription>>,
    slots: std::sync::Weak<ObservationSlots>,
    inner: Arc<dyn ObservationSink>,
}

impl ObservationSink for SlotReleasingSink {
    fn on_update(&self, outcome: ResourceOutcome) {
        self.inner.on_update(outcome);
    }

    fn on_closed(&self) {
        if let (Some(slots), Some(slot)) = (self.slots.upgrade(), self.slot.upgrade()) {
            slots.remove_if(&self.resource, |_, existing| Arc::ptr_eq(existing, &slot));
        }
        self.inner.on_closed();
    }
}

/// Object-safe view of a gateway, used by processors and the registrar.
#[async_trait]
pub trait OriginGateway: Send + Sync {
    fn scheme(&self) -> &'static str;

    /// Translate and send a proxy request to `origin`.
    async fn forward(&self, request: &ProxyRequest, origin: &Url) -> Result<ResourceOutcome, DispatchError>;

    fn supports_observation(&self) -> bool;

    async fn observe(&self, origin: &Url, sink: Arc<dyn ObservationSink>) -> Result<Subscription, GatewayError>;

    fn unobserve(&self, origin: &Url) -> bool;

    async fn shutdown(&self);
}

#[async_trait]
impl<A: ProtocolAdapter> OriginGateway for BackendGateway<A> {
    fn scheme(&self) -> &'static str {
        self.adapter.scheme()
    }

    async fn forward(&self, request: &ProxyRequest, origin: &Url) -> Result<ResourceOutcome, DispatchError> {
        let native = self.translate(request, origin)?;
        self.send(native).await.map_err(|e| {
            tracing::error!(resource = %origin, method = %request.method(), error = %e, "Back-end request failed");
            DispatchError::Internal(e.to_string())
        })
    }

    fn supports_observation(&self) -> bool {
        self.adapter.supports_observation()
    }

    async fn observe(&self, origin: &Url, sink: Arc<dyn ObservationSink>) -> Result<Subscription, GatewayError> {
        BackendGateway::observe(self, origin, sink).await
    }

    fn unobserve(&self, origin: &Url) -> bool {
        BackendGateway::unobserve(self, origin)
    }

    async fn shutdown(&self) {
        BackendGateway::shutdown(self).await
    }
}
