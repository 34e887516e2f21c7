//! Inbound request as seen by processors.

use axum::http::{header, HeaderMap, Method};
use bytes::Bytes;
use url::Url;

use crate::rdf::{self, Language};

/// Immutable record of one inbound HTTP request, addressed by its
/// normalized proxy URI.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    target: Url,
    method: Method,
    body: Option<Bytes>,
    accept: Option<String>,
    content_type: Option<String>,
}

impl ProxyRequest {
    pub fn new(target: Url, method: Method) -> Self {
        Self {
            target,
            method,
            body: None,
            accept: None,
            content_type: None,
        }
    }

    /// Build from the parts of an HTTP request. Empty bodies are dropped.
    pub fn from_http(target: Url, method: Method, headers: &HeaderMap, body: Bytes) -> Self {
        let header_value = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        Self {
            target,
            method,
            body: (!body.is_empty()).then_some(body),
            accept: header_value(header::ACCEPT),
            content_type: header_value(header::CONTENT_TYPE),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.body = (!body.is_empty()).then_some(body);
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Value of a query parameter of the proxy URI.
    pub fn query_parameter(&self, name: &str) -> Option<String> {
        self.target
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Serialization the client asked for.
    pub fn response_language(&self) -> Language {
        rdf::negotiate(self.accept())
    }
}
