//! Proxy URI → processor registry.
//!
//! The only state shared by every dispatch path. Inserts go through the
//! map's entry API so the duplicate check and the insert are one step; a
//! lookup sees either no entry or a complete one.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use super::addressing::normalize;
use super::processor::Processor;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a service is already registered at {0}")]
    AlreadyRegistered(Url),
}

#[derive(Default)]
pub struct ServiceRegistry {
    entries: DashMap<Url, Arc<Processor>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor. Fails if the URI is taken.
    pub fn register(&self, uri: Url, processor: Processor) -> Result<(), RegistryError> {
        let uri = normalize(uri);
        let kind = processor.kind();
        match self.entries.entry(uri.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(uri = %uri, "Rejected duplicate service registration");
                return Err(RegistryError::AlreadyRegistered(uri));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(processor));
            }
        }

        tracing::info!(uri = %uri, kind, "Registered service");
        metrics::set_registered_services(self.entries.len());
        Ok(())
    }

    /// Remove a registration. Returns whether one existed.
    pub fn unregister(&self, uri: &Url) -> bool {
        let uri = normalize(uri.clone());
        let removed = self.entries.remove(&uri).is_some();
        if removed {
            tracing::info!(uri = %uri, "Unregistered service");
            metrics::set_registered_services(self.entries.len());
        }
        removed
    }

    /// Find the processor for a normalized proxy URI.
    ///
    /// Exact matches win. Otherwise the URI without its query matches a
    /// processor that takes its target from the query.
    pub fn lookup(&self, uri: &Url) -> Option<Arc<Processor>> {
        if let Some(entry) = self.entries.get(uri) {
            return Some(Arc::clone(entry.value()));
        }

        uri.query()?;
        let mut base = uri.clone();
        base.set_query(None);
        self.entries
            .get(&base)
            .filter(|entry| entry.value().query_addressed())
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.entries.contains_key(&normalize(uri.clone()))
    }

    /// Registered proxy URIs, sorted. Computed from the map on every call.
    pub fn services(&self) -> Vec<Url> {
        let mut services: Vec<Url> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        services.sort();
        services
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-through view of the registered proxy URIs.
///
/// Holds no copy of its own, so it can never go stale.
#[derive(Clone)]
pub struct ServiceDirectory {
    registry: Arc<ServiceRegistry>,
}

impl ServiceDirectory {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn services(&self) -> Vec<Url> {
        self.registry.services()
    }
}
