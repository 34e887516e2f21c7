//! Request processors that can be registered under a proxy URI.

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use oxigraph::model::NamedNode;
use std::fmt;
use std::sync::Arc;
use url::Url;

use super::error::DispatchError;
use super::request::ProxyRequest;
use crate::backend::{OriginGateway, ResourceOutcome};
use crate::cache::{CacheUpdater, CachedGraph};

/// Response produced by a static page or built-in service.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: Bytes,
}

impl PageResponse {
    pub fn ok(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some(content_type),
            body: body.into(),
        }
    }

    pub fn text(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8"),
            body: Bytes::from(message.into()),
        }
    }
}

/// A page answered locally, without any back-end.
#[async_trait]
pub trait WebPage: Send + Sync {
    async fn respond(&self, request: &ProxyRequest) -> PageResponse;
}

/// A processor answering with a semantic resource.
#[async_trait]
pub trait SemanticProcessor: Send + Sync {
    async fn process(&self, request: &ProxyRequest) -> Result<ResourceOutcome, DispatchError>;

    /// Whether the processor also serves its URI with any query string,
    /// taking its target from the query.
    fn query_addressed(&self) -> bool {
        false
    }
}

/// Registry entry value.
#[derive(Clone)]
pub enum Processor {
    Page(Arc<dyn WebPage>),
    Semantic(Arc<dyn SemanticProcessor>),
    Graph(Arc<GraphReader>),
}

/// What a processor produced, before rendering.
#[derive(Debug)]
pub enum ProcessorOutput {
    Page(PageResponse),
    Resource(Result<ResourceOutcome, DispatchError>),
}

impl Processor {
    pub async fn run(&self, request: &ProxyRequest) -> ProcessorOutput {
        match self {
            Processor::Page(page) => ProcessorOutput::Page(page.respond(request).await),
            Processor::Semantic(processor) => ProcessorOutput::Resource(processor.process(request).await),
            Processor::Graph(reader) => ProcessorOutput::Resource(reader.process(request).await),
        }
    }

    pub fn query_addressed(&self) -> bool {
        match self {
            Processor::Semantic(processor) => processor.query_addressed(),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Processor::Page(_) => "page",
            Processor::Semantic(_) => "semantic",
            Processor::Graph(_) => "graph",
        }
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Processor::{}", self.kind())
    }
}

/// Serves a named graph from the cache.
///
/// On a cache miss the reader asks the origin gateway (when the graph has
/// one) and caches a successful answer.
pub struct GraphReader {
    graph: NamedNode,
    origin: Option<(Arc<dyn OriginGateway>, Url)>,
    updater: CacheUpdater,
}

impl GraphReader {
    pub fn new(graph: NamedNode, updater: CacheUpdater) -> Self {
        Self {
            graph,
            origin: None,
            updater,
        }
    }

    pub fn with_origin(mut self, gateway: Arc<dyn OriginGateway>, origin: Url) -> Self {
        self.origin = Some((gateway, origin));
        self
    }

    pub fn graph(&self) -> &NamedNode {
        &self.graph
    }
}

#[async_trait]
impl SemanticProcessor for GraphReader {
    async fn process(&self, request: &ProxyRequest) -> Result<ResourceOutcome, DispatchError> {
        if request.method() != Method::GET {
            return Err(DispatchError::MethodNotAllowed(request.method().clone()));
        }

        let cached = self
            .updater
            .cache()
            .get_named_graph(&self.graph)
            .map_err(|e| DispatchError::Internal(e.to_string()))?;
        if let Some(cached) = cached {
            tracing::debug!(graph = %self.graph, "Serving graph from cache");
            return Ok(ResourceOutcome::Success {
                graph: cached.graph,
                expiry: cached.expiry,
            });
        }

        let Some((gateway, origin)) = &self.origin else {
            return Err(DispatchError::OriginNotFound(self.graph.as_str().to_string()));
        };

        tracing::debug!(graph = %self.graph, origin = %origin, "Cache miss, asking origin");
        let outcome = gateway.forward(request, origin).await?;
        if let ResourceOutcome::Success { graph, expiry } = &outcome {
            let entry = CachedGraph {
                name: self.graph.clone(),
                graph: graph.clone(),
                expiry: *expiry,
            };
            if let Err(e) = self.updater.store(entry) {
                tracing::warn!(graph = %self.graph, error = %e, "Failed to cache origin response");
            }
        }
        Ok(outcome)
    }
}
