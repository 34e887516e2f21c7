//! Wires a CoAP client endpoint into the proxy: the generic gateway path
//! and the configured origins.

use std::sync::Arc;
use url::Url;

use super::adapter::CoapAdapter;
use super::client::CoapClient;
use super::reliability::TransmissionParameters;
use crate::backend::{
    BackendGateway, DataOrigin, DataOriginRegistrar, GatewayService, OriginGateway, RegistrationError,
    TargetResolution,
};
use crate::config::schema::{CoapConfig, CoapOriginConfig};
use crate::dispatch::{Processor, ServiceRegistry};

/// Query parameter of the generic path naming the origin.
pub const ORIGIN_PARAMETER: &str = "uri";

pub struct CoapBackend {
    gateway: Arc<BackendGateway<CoapAdapter>>,
}

impl CoapBackend {
    /// Bind the endpoint described by `config`.
    pub async fn start(config: &CoapConfig) -> std::io::Result<CoapBackend> {
        let address = config
            .bind_address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let client = CoapClient::bind(address, TransmissionParameters::from_config(config)).await?;
        Ok(Self::with_client(client, config.confirmable))
    }

    pub fn with_client(client: CoapClient, confirmable: bool) -> CoapBackend {
        Self {
            gateway: Arc::new(BackendGateway::new(CoapAdapter::new(client, confirmable))),
        }
    }

    pub fn gateway(&self) -> Arc<dyn OriginGateway> {
        self.gateway.clone()
    }

    pub fn client(&self) -> &CoapClient {
        self.gateway.adapter().client()
    }

    /// Register the generic gateway taking its origin from `?uri=`.
    pub fn register_generic(&self, registry: &ServiceRegistry, registrar: &DataOriginRegistrar, uri: Url) -> Result<Url, RegistrationError> {
        let service = GatewayService::new(
            self.gateway(),
            TargetResolution::FromQuery(ORIGIN_PARAMETER),
            registrar.updater().clone(),
        );
        registry.register(uri.clone(), Processor::Semantic(Arc::new(service)))?;
        Ok(uri)
    }

    /// Register the configured origins as data origins. Failures are logged
    /// and skipped.
    pub async fn register_origins(&self, registrar: &DataOriginRegistrar, origins: &[CoapOriginConfig]) -> Vec<Url> {
        let mut registered = Vec::with_capacity(origins.len());
        for origin in origins {
            let identifier = match Url::parse(&origin.uri) {
                Ok(identifier) => identifier,
                Err(e) => {
                    tracing::error!(origin = %origin.uri, error = %e, "Skipping invalid CoAP origin");
                    continue;
                }
            };
            let data_origin = DataOrigin::Remote {
                identifier,
                gateway: self.gateway(),
                observe: origin.observe,
            };
            match registrar.register_data_origin(data_origin).await {
                Ok(uri) => registered.push(uri),
                Err(e) => tracing::error!(origin = %origin.uri, error = %e, "Failed to register CoAP origin"),
            }
        }
        registered
    }

    pub async fn shutdown(&self) {
        self.gateway.shutdown().await;
    }
}
