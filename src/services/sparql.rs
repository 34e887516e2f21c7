//! SPARQL endpoint over the cache.
//!
//! Accepts POST with a form field `query` or a raw
//! `application/sparql-query` body. SELECT and ASK answer with SPARQL JSON
//! results; CONSTRUCT and DESCRIBE with a graph in the negotiated language.

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use std::sync::Arc;

use crate::cache::{CacheError, ResultSet, SemanticCache};
use crate::dispatch::{PageResponse, ProxyRequest, WebPage};
use crate::rdf::serialize_graph;

const FORM: &str = "application/x-www-form-urlencoded";
const SPARQL_QUERY: &str = "application/sparql-query";
const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

pub struct SparqlEndpoint {
    cache: Arc<dyn SemanticCache>,
}

impl SparqlEndpoint {
    pub fn new(cache: Arc<dyn SemanticCache>) -> Self {
        Self { cache }
    }
}

/// Query text carried by a request.
fn extract_query(request: &ProxyRequest) -> Option<String> {
    let body = request.body()?;
    let media_type = request
        .content_type()
        .and_then(|content_type| content_type.split(';').next())
        .map(|media_type| media_type.trim().to_ascii_lowercase());

    let query = match media_type.as_deref() {
        Some(SPARQL_QUERY) => String::from_utf8(body.to_vec()).ok(),
        Some(FORM) | None => url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "query")
            .map(|(_, value)| value.into_owned()),
        Some(_) => None,
    };
    query.filter(|query| !query.trim().is_empty())
}

#[async_trait]
impl WebPage for SparqlEndpoint {
    async fn respond(&self, request: &ProxyRequest) -> PageResponse {
        if request.method() != Method::POST {
            return PageResponse::text(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Method {} is not allowed.", request.method()),
            );
        }
        let Some(query) = extract_query(request) else {
            return PageResponse::text(StatusCode::BAD_REQUEST, "No SPARQL query in request.");
        };

        tracing::debug!(query = %query, "Processing SPARQL query");
        match self.cache.process_query(&query) {
            Ok(ResultSet::Solutions(json)) => json_page(&json),
            Ok(ResultSet::Boolean(answer)) => json_page(&serde_json::json!({ "head": {}, "boolean": answer })),
            Ok(ResultSet::Graph(graph)) => {
                let language = request.response_language();
                match serialize_graph(&graph, language) {
                    Ok(body) => PageResponse::ok(language.mime_type(), body),
                    Err(e) => PageResponse::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                }
            }
            Err(e @ (CacheError::InvalidQuery(_) | CacheError::Unsupported(_))) => {
                PageResponse::text(StatusCode::BAD_REQUEST, e.to_string())
            }
            Err(e @ (CacheError::Storage(_) | CacheError::Evaluation(_))) => {
                tracing::warn!(error = %e, "SPARQL evaluation failed");
                PageResponse::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

fn json_page(value: &serde_json::Value) -> PageResponse {
    match serde_json::to_vec(value) {
        Ok(body) => PageResponse::ok(SPARQL_RESULTS_JSON, body),
        Err(e) => PageResponse::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
