//! Built-in services answered by the proxy itself.
//!
//! - `/` lists every registered proxy URI (HTML, or JSON on request)
//! - `/favicon.ico` serves the embedded icon
//! - the SPARQL endpoint queries the cache
//! - the virtual sensor form defines sensors over the cache

pub mod favicon;
pub mod list;
pub mod sparql;
pub mod virtual_sensor;

use std::sync::Arc;

pub use favicon::Favicon;
pub use list::ServiceList;
pub use sparql::SparqlEndpoint;
pub use virtual_sensor::VirtualSensorCreator;

use crate::backend::VirtualSensors;
use crate::cache::SemanticCache;
use crate::config::schema::SparqlConfig;
use crate::dispatch::{AddressingError, Processor, ProxyAddressing, RegistryError, ServiceDirectory, ServiceRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Addressing(#[from] AddressingError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Register the list page, the favicon and (when enabled) the SPARQL
/// endpoint.
pub fn register_builtin_services(
    registry: &Arc<ServiceRegistry>,
    addressing: &ProxyAddressing,
    cache: Arc<dyn SemanticCache>,
    sparql: &SparqlConfig,
) -> Result<(), ServiceError> {
    let directory = ServiceDirectory::new(Arc::clone(registry));
    registry.register(
        addressing.proxy_uri("/")?,
        Processor::Page(Arc::new(ServiceList::new(directory))),
    )?;
    registry.register(addressing.proxy_uri("/favicon.ico")?, Processor::Page(Arc::new(Favicon)))?;

    if sparql.enabled {
        registry.register(
            addressing.proxy_uri(&sparql.path)?,
            Processor::Page(Arc::new(SparqlEndpoint::new(cache))),
        )?;
    }
    Ok(())
}

/// Register the virtual sensor creation form at `path`.
pub fn register_virtual_sensor_creator(
    registry: &ServiceRegistry,
    addressing: &ProxyAddressing,
    sensors: Arc<VirtualSensors>,
    path: &str,
) -> Result<url::Url, ServiceError> {
    let uri = addressing.proxy_uri(path)?;
    registry.register(uri.clone(), Processor::Page(Arc::new(VirtualSensorCreator::new(sensors))))?;
    Ok(uri)
}
