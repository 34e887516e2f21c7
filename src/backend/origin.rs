//! Data-origin registration.
//!
//! The only entry point through which non-HTTP subsystems (static files,
//! observed origins) feed the cache. Each origin gets a cache-backed
//! `GraphReader` under its own proxy URI.

use dashmap::DashMap;
use futures_util::future::join_all;
use oxigraph::model::{Graph, NamedNode};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use super::adapter::ObservationSink;
use super::gateway::OriginGateway;
use super::outcome::ResourceOutcome;
use crate::cache::{CacheError, CacheUpdater, CachedGraph};
use crate::dispatch::{AddressingError, GraphReader, Processor, ProxyAddressing, RegistryError, ServiceRegistry};
use crate::rdf::far_future_expiry;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid origin identifier {0}")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Addressing(#[from] AddressingError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("cache update was interrupted: {0}")]
    Interrupted(String),
}

/// A source of RDF data.
pub enum DataOrigin {
    /// Graph known up front, e.g. loaded from a file.
    Static { identifier: Url, graph: Graph },
    /// Resource behind a back-end gateway.
    Remote {
        identifier: Url,
        gateway: Arc<dyn OriginGateway>,
        observe: bool,
    },
}

impl DataOrigin {
    pub fn identifier(&self) -> &Url {
        match self {
            DataOrigin::Static { identifier, .. } | DataOrigin::Remote { identifier, .. } => identifier,
        }
    }
}

/// Change to apply to the cache.
pub enum CacheUpdate {
    Graph {
        identifier: Url,
        graph: Graph,
        expiry: SystemTime,
    },
    Delete(Url),
}

struct RegisteredOrigin {
    proxy_uri: Url,
    gateway: Option<Arc<dyn OriginGateway>>,
}

#[derive(Clone)]
pub struct DataOriginRegistrar {
    registry: Arc<ServiceRegistry>,
    addressing: ProxyAddressing,
    updater: CacheUpdater,
    origins: Arc<DashMap<Url, RegisteredOrigin>>,
}

impl DataOriginRegistrar {
    pub fn new(registry: Arc<ServiceRegistry>, addressing: ProxyAddressing, updater: CacheUpdater) -> Self {
        Self {
            registry,
            addressing,
            updater,
            origins: Arc::new(DashMap::new()),
        }
    }

    pub fn updater(&self) -> &CacheUpdater {
        &self.updater
    }

    /// Proxy URI of a registered origin.
    pub fn proxy_uri(&self, identifier: &Url) -> Option<Url> {
        self.origins.get(identifier).map(|origin| origin.proxy_uri.clone())
    }

    /// Register an origin and return its proxy URI.
    pub async fn register_data_origin(&self, origin: DataOrigin) -> Result<Url, RegistrationError> {
        let identifier = origin.identifier().clone();
        let graph_name = graph_name(&identifier)?;
        let reader = GraphReader::new(graph_name, self.updater.clone());

        let (proxy_uri, reader, gateway, observe, initial) = match origin {
            DataOrigin::Static { graph, .. } => {
                (self.addressing.graph_uri(identifier.as_str())?, reader, None, false, Some(graph))
            }
            DataOrigin::Remote { gateway, observe, .. } => (
                self.addressing.resource_uri(&identifier)?,
                reader.with_origin(Arc::clone(&gateway), identifier.clone()),
                Some(gateway),
                observe,
                None,
            ),
        };

        self.registry
            .register(proxy_uri.clone(), Processor::Graph(Arc::new(reader)))?;
        self.origins.insert(
            identifier.clone(),
            RegisteredOrigin {
                proxy_uri: proxy_uri.clone(),
                gateway: gateway.clone(),
            },
        );

        if let Some(graph) = initial {
            let stored = self
                .update_cache(CacheUpdate::Graph {
                    identifier: identifier.clone(),
                    graph,
                    expiry: far_future_expiry(),
                })
                .await;
            if let Err(e) = stored {
                self.origins.remove(&identifier);
                self.registry.unregister(&proxy_uri);
                tracing::warn!(origin = %identifier, error = %e, "Initial graph not cached, registration rolled back");
                return Err(e);
            }
        }

        if let Some(gateway) = gateway.filter(|gateway| observe && gateway.supports_observation()) {
            let sink = Arc::new(CacheSink::spawn(
                identifier.clone(),
                self.updater.clone(),
                Arc::clone(&self.origins),
            )?);
            if let Err(e) = gateway.observe(&identifier, sink).await {
                tracing::warn!(origin = %identifier, error = %e, "Could not observe origin, serving on demand");
            }
        }

        tracing::info!(origin = %identifier, proxy_uri = %proxy_uri, "Registered data origin");
        Ok(proxy_uri)
    }

    /// Remove an origin, its cached graph and its observation.
    pub async fn unregister_data_origin(&self, identifier: &Url) -> bool {
        let Some((_, origin)) = self.origins.remove(identifier) else {
            return false;
        };

        self.registry.unregister(&origin.proxy_uri);
        if let Some(gateway) = origin.gateway {
            gateway.unobserve(identifier);
        }
        if let Err(e) = self.update_cache(CacheUpdate::Delete(identifier.clone())).await {
            tracing::warn!(origin = %identifier, error = %e, "Failed to drop cached graph of origin");
        }

        tracing::info!(origin = %identifier, "Unregistered data origin");
        true
    }

    /// Apply a cache update on the worker pool.
    pub async fn update_cache(&self, update: CacheUpdate) -> Result<(), RegistrationError> {
        let updater = self.updater.clone();
        let task = self.updater.workers().spawn(async move {
            match update {
                CacheUpdate::Graph {
                    identifier,
                    graph,
                    expiry,
                } => updater.store(CachedGraph {
                    name: graph_name(&identifier)?,
                    graph,
                    expiry,
                }),
                CacheUpdate::Delete(identifier) => updater.remove(&graph_name(&identifier)?).map(|_| ()),
            }
            .map_err(RegistrationError::from)
        });

        task.await
            .map_err(|e| RegistrationError::Interrupted(e.to_string()))?
    }

    /// Replace the graph of a registered origin. Returns false without
    /// writing once the origin is unregistered.
    pub async fn refresh_origin(
        &self,
        identifier: &Url,
        graph: Graph,
        expiry: SystemTime,
    ) -> Result<bool, RegistrationError> {
        let name = graph_name(identifier)?;
        let identifier = identifier.clone();
        let origins = Arc::clone(&self.origins);
        let updater = self.updater.clone();
        let task = self.updater.workers().spawn(async move {
            let Some(_registered) = origins.get(&identifier) else {
                return Ok(false);
            };
            updater
                .store(CachedGraph { name, graph, expiry })
                .map_err(RegistrationError::from)?;
            Ok::<_, RegistrationError>(true)
        });

        task.await
            .map_err(|e| RegistrationError::Interrupted(e.to_string()))?
    }

    /// Unregister every origin.
    pub async fn shutdown(&self) {
        let identifiers: Vec<Url> = self.origins.iter().map(|entry| entry.key().clone()).collect();
        join_all(identifiers.iter().map(|identifier| self.unregister_data_origin(identifier))).await;
    }
}

fn graph_name(identifier: &Url) -> Result<NamedNode, RegistrationError> {
    NamedNode::new(identifier.as_str()).map_err(|_| RegistrationError::InvalidIdentifier(identifier.to_string()))
}

/// Feeds observation updates of one origin into the cache.
///
/// Updates are applied one at a time by a single worker task, in the
/// order the transport delivered them.
struct CacheSink {
    identifier: Url,
    updates: mpsc::UnboundedSender<ResourceOutcome>,
}

impl CacheSink {
    fn spawn(
        identifier: Url,
        updater: CacheUpdater,
        origins: Arc<DashMap<Url, RegisteredOrigin>>,
    ) -> Result<Self, RegistrationError> {
        let name = graph_name(&identifier)?;
        let (updates, mut pending) = mpsc::unbounded_channel();
        let origin = identifier.clone();

        let workers = updater.workers().clone();
        workers.spawn(async move {
            while let Some(outcome) = pending.recv().await {
                // Holding the entry keeps unregistration from interleaving
                // with the write.
                let Some(_registered) = origins.get(&origin) else {
                    tracing::debug!(origin = %origin, "Origin unregistered, dropping pending updates");
                    return;
                };
                apply_observation(&updater, &origin, &name, outcome);
            }
        });

        Ok(Self { identifier, updates })
    }
}

fn apply_observation(updater: &CacheUpdater, identifier: &Url, name: &NamedNode, outcome: ResourceOutcome) {
    let result = match outcome {
        ResourceOutcome::Success { graph, expiry } => updater
            .store(CachedGraph {
                name: name.clone(),
                graph,
                expiry,
            })
            .map(|_| "stored"),
        ResourceOutcome::ApplicationError { status, .. } if status.as_u16() == 404 => {
            updater.remove(name).map(|_| "removed")
        }
        other => {
            tracing::warn!(
                origin = %identifier,
                outcome = other.kind(),
                message = other.message().unwrap_or_default(),
                "Ignoring observation update"
            );
            return;
        }
    };
    match result {
        Ok(action) => tracing::debug!(origin = %identifier, action, "Applied observation update"),
        Err(e) => tracing::warn!(origin = %identifier, error = %e, "Failed to apply observation update"),
    }
}

impl ObservationSink for CacheSink {
    fn on_update(&self, outcome: ResourceOutcome) {
        if self.updates.send(outcome).is_err() {
            tracing::debug!(origin = %self.identifier, "Dropping update for unregistered origin");
        }
    }

    fn on_closed(&self) {
        tracing::info!(origin = %self.identifier, "Observation of origin ended");
    }
}
