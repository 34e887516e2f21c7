//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the cache, the registry and the registrar
//! - Register built-in services, CoAP back-end, static files and virtual
//!   sensors
//! - Assemble the dispatcher and the HTTP router
//!
//! # Design Decisions
//! - Fail fast on infrastructure errors (cache, socket, built-in URIs)
//! - A single bad origin or file is logged and skipped
//! - Listeners start last (traffic only when ready)

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::backend::{register_files, DataOriginRegistrar, RegistrationError, VirtualSensors};
use crate::cache::{CacheError, CacheUpdater, DummyCache, OxigraphCache, SemanticCache};
use crate::coap::CoapBackend;
use crate::config::schema::CacheBackend;
use crate::config::ProxyConfig;
use crate::dispatch::{AddressingError, ProxyAddressing, RequestDispatcher, ServiceRegistry};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{Shutdown, WorkerPool};
use crate::services::{register_builtin_services, register_virtual_sensor_creator, ServiceError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cache: {0}")]
    Cache(#[from] CacheError),

    #[error("built-in services: {0}")]
    Services(#[from] ServiceError),

    #[error("could not bind CoAP endpoint: {0}")]
    CoapBind(#[source] std::io::Error),

    #[error(transparent)]
    Addressing(#[from] AddressingError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// A fully wired proxy, ready to serve.
pub struct Proxy {
    config: ProxyConfig,
    registry: Arc<ServiceRegistry>,
    registrar: DataOriginRegistrar,
    dispatcher: Arc<RequestDispatcher>,
    coap: Option<CoapBackend>,
    virtual_sensors: Option<Arc<VirtualSensors>>,
}

impl Proxy {
    /// Build every subsystem. Must run on the IO runtime, which then owns
    /// the CoAP socket.
    pub async fn start(config: ProxyConfig, workers: WorkerPool) -> Result<Proxy, StartupError> {
        let addressing = ProxyAddressing::from_config(&config.addressing);

        let cache: Arc<dyn SemanticCache> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(OxigraphCache::new()?),
            CacheBackend::None => Arc::new(DummyCache),
        };
        let updater = CacheUpdater::new(
            Arc::clone(&cache),
            workers.clone(),
            Duration::from_secs(config.cache.expiry_grace_secs),
        );

        let registry = Arc::new(ServiceRegistry::new());
        let registrar = DataOriginRegistrar::new(Arc::clone(&registry), addressing.clone(), updater);
        register_builtin_services(&registry, &addressing, cache, &config.sparql)?;

        let coap = if config.coap.enabled {
            let backend = CoapBackend::start(&config.coap)
                .await
                .map_err(StartupError::CoapBind)?;
            let generic = backend.register_generic(
                &registry,
                &registrar,
                addressing.proxy_uri(&config.coap.generic_path)?,
            )?;
            tracing::info!(uri = %generic, "Generic CoAP gateway registered");
            let origins = backend.register_origins(&registrar, &config.coap.origins).await;
            tracing::info!(registered = origins.len(), configured = config.coap.origins.len(), "CoAP origins registered");
            Some(backend)
        } else {
            None
        };

        let files = register_files(&registrar, &config.files).await;
        tracing::info!(registered = files.len(), configured = config.files.len(), "RDF files registered");

        let virtual_sensors = if config.virtual_sensors.enabled {
            let sensors = VirtualSensors::new(
                registrar.clone(),
                addressing.clone(),
                Duration::from_secs(config.virtual_sensors.period_secs),
            );
            let creator = register_virtual_sensor_creator(
                &registry,
                &addressing,
                Arc::clone(&sensors),
                &config.virtual_sensors.creation_path,
            )?;
            tracing::info!(uri = %creator, "Virtual sensor creation registered");
            let created = sensors.create_configured(&config.virtual_sensors.sensors).await;
            tracing::info!(
                created = created.len(),
                configured = config.virtual_sensors.sensors.len(),
                "Virtual sensors created"
            );
            Some(sensors)
        } else {
            None
        };

        let dispatcher = Arc::new(RequestDispatcher::new(Arc::clone(&registry), addressing, workers));
        Ok(Proxy {
            config,
            registry,
            registrar,
            dispatcher,
            coap,
            virtual_sensors,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn registrar(&self) -> &DataOriginRegistrar {
        &self.registrar
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    pub fn coap(&self) -> Option<&CoapBackend> {
        self.coap.as_ref()
    }

    pub fn virtual_sensors(&self) -> Option<&Arc<VirtualSensors>> {
        self.virtual_sensors.as_ref()
    }

    fn server(&self) -> HttpServer {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            max_body_size: self.config.security.max_body_size,
        };
        HttpServer::new(state, Duration::from_secs(self.config.timeouts.request_secs))
    }

    /// Router with all middleware, e.g. for driving requests in-process.
    pub fn router(&self) -> Router {
        self.server().router()
    }

    /// Serve until `shutdown` fires.
    pub async fn serve(&self, listener: TcpListener, shutdown: Shutdown) -> std::io::Result<()> {
        self.server().run(listener, shutdown).await
    }

    /// Cancel observations and complete every in-flight back-end request.
    pub async fn shutdown(&self) {
        if let Some(sensors) = &self.virtual_sensors {
            sensors.shutdown();
        }
        self.registrar.shutdown().await;
        if let Some(coap) = &self.coap {
            coap.shutdown().await;
        }
        tracing::info!(services = self.registry.len(), "Back-ends shut down");
    }
}
