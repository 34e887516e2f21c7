//! Request dispatcher.
//!
//! Pipeline: normalize → lookup → run processor on the worker pool →
//! render. Every stage returns a value; the dispatcher always answers.

use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

use super::addressing::ProxyAddressing;
use super::error::DispatchError;
use super::processor::ProcessorOutput;
use super::registry::ServiceRegistry;
use super::request::ProxyRequest;
use crate::http::response::{render_error, render_outcome, render_page};
use crate::lifecycle::WorkerPool;
use crate::observability::metrics;

pub struct RequestDispatcher {
    registry: Arc<ServiceRegistry>,
    addressing: ProxyAddressing,
    workers: WorkerPool,
}

impl RequestDispatcher {
    pub fn new(registry: Arc<ServiceRegistry>, addressing: ProxyAddressing, workers: WorkerPool) -> Self {
        Self {
            registry,
            addressing,
            workers,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn addressing(&self) -> &ProxyAddressing {
        &self.addressing
    }

    /// Dispatch a buffered HTTP request.
    pub async fn dispatch(&self, request: Request<Bytes>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let response = self.dispatch_inner(request).await;
        metrics::record_request(method.as_str(), response.status().as_u16(), start);
        response
    }

    async fn dispatch_inner(&self, request: Request<Bytes>) -> Response {
        let (parts, body) = request.into_parts();
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok());

        let target = match self.addressing.resolve(&parts.uri, host) {
            Ok(target) => target,
            Err(e) => {
                tracing::debug!(uri = %parts.uri, error = %e, "Could not normalize request URI");
                return render_error(&DispatchError::bad_request(e.to_string()));
            }
        };

        let Some(processor) = self.registry.lookup(&target) else {
            tracing::debug!(uri = %target, method = %parts.method, "No service registered");
            return render_error(&DispatchError::OriginNotFound(target.to_string()));
        };

        let request = ProxyRequest::from_http(target, parts.method, &parts.headers, body);
        tracing::debug!(uri = %request.target(), method = %request.method(), kind = processor.kind(), "Dispatching request");

        let language = request.response_language();
        let task = {
            let request = request.clone();
            self.workers
                .spawn(async move { processor.run(&request).await })
        };

        match task.await {
            Ok(ProcessorOutput::Page(page)) => render_page(page),
            Ok(ProcessorOutput::Resource(Ok(outcome))) => {
                if !outcome.is_success() {
                    tracing::info!(
                        uri = %request.target(),
                        method = %request.method(),
                        status = %outcome.status(),
                        outcome = outcome.kind(),
                        "Back-end request failed"
                    );
                }
                render_outcome(outcome, language)
            }
            Ok(ProcessorOutput::Resource(Err(error))) => {
                if error.status() == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(uri = %request.target(), method = %request.method(), error = %error, "Processor failed");
                }
                render_error(&error)
            }
            Err(join_error) => {
                tracing::error!(
                    uri = %request.target(),
                    method = %request.method(),
                    error = %join_error,
                    "Processor task did not complete"
                );
                render_error(&DispatchError::Internal(join_error.to_string()))
            }
        }
    }
}
