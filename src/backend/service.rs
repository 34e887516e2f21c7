//! Semantic gateway service: forwards proxy requests to one origin or to
//! the origin named in the request's query.

use async_trait::async_trait;
use axum::http::Method;
use oxigraph::model::NamedNode;
use std::sync::Arc;
use url::Url;

use super::gateway::OriginGateway;
use super::outcome::ResourceOutcome;
use super::translator::RequestMethod;
use crate::cache::{CacheUpdater, CachedGraph};
use crate::dispatch::{DispatchError, ProxyRequest, SemanticProcessor};

/// How a gateway service finds its origin.
#[derive(Debug, Clone)]
pub enum TargetResolution {
    Fixed(Url),
    /// Origin URI taken from a query parameter of the proxy URI.
    FromQuery(&'static str),
}

pub struct GatewayService {
    gateway: Arc<dyn OriginGateway>,
    target: TargetResolution,
    updater: CacheUpdater,
}

impl GatewayService {
    pub fn new(gateway: Arc<dyn OriginGateway>, target: TargetResolution, updater: CacheUpdater) -> Self {
        Self {
            gateway,
            target,
            updater,
        }
    }

    fn resolve_origin(&self, request: &ProxyRequest) -> Result<Url, DispatchError> {
        let origin = match &self.target {
            TargetResolution::Fixed(origin) => return Ok(origin.clone()),
            TargetResolution::FromQuery(parameter) => request
                .query_parameter(parameter)
                .and_then(|value| Url::parse(&value).ok()),
        };

        match origin {
            Some(origin) if origin.scheme() == self.gateway.scheme() && origin.host().is_some() => Ok(origin),
            _ => Err(DispatchError::bad_gateway(format!(
                "Requested URI scheme was either empty or not {}.",
                self.gateway.scheme()
            ))),
        }
    }

    fn cache_success(&self, origin: &Url, outcome: &ResourceOutcome) {
        let ResourceOutcome::Success { graph, expiry } = outcome else {
            return;
        };
        let name = match NamedNode::new(origin.as_str()) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Origin URI is not a valid graph name");
                return;
            }
        };
        let entry = CachedGraph {
            name,
            graph: graph.clone(),
            expiry: *expiry,
        };
        if let Err(e) = self.updater.store(entry) {
            tracing::warn!(origin = %origin, error = %e, "Failed to cache origin response");
        }
    }
}

#[async_trait]
impl SemanticProcessor for GatewayService {
    async fn process(&self, request: &ProxyRequest) -> Result<ResourceOutcome, DispatchError> {
        RequestMethod::try_from(request.method())?;
        let origin = self.resolve_origin(request)?;
        let outcome = self.gateway.forward(request, &origin).await?;
        if request.method() == Method::GET {
            self.cache_success(&origin, &outcome);
        }
        Ok(outcome)
    }

    fn query_addressed(&self) -> bool {
        matches!(self.target, TargetResolution::FromQuery(_))
    }
}
