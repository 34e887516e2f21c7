//! Rendering of dispatch results as HTTP responses.
//!
//! # Responsibilities
//! - Serialize successful graphs in the negotiated language
//! - Set `Expires` from the outcome's expiry
//! - Render every failure as its status with a plain-text message
//!
//! Nothing here can fail: a graph that cannot be serialized becomes a 500.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

use crate::backend::ResourceOutcome;
use crate::dispatch::{DispatchError, PageResponse};
use crate::rdf::{self, Language};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Render a back-end outcome.
pub fn render_outcome(outcome: ResourceOutcome, language: Language) -> Response {
    match outcome {
        ResourceOutcome::Success { graph, expiry } => match rdf::serialize_graph(&graph, language) {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, language.mime_type())
                .header(header::EXPIRES, httpdate::fmt_http_date(expiry))
                .body(Body::from(body))
                .unwrap_or_else(|e| internal_error(e.to_string())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize graph");
                internal_error(e.to_string())
            }
        },
        ResourceOutcome::SuccessNoContent { status } => empty(status),
        failure => {
            let status = failure.status();
            text(status, failure.message().unwrap_or_default())
        }
    }
}

/// Render an error resolved at the dispatcher boundary.
pub fn render_error(error: &DispatchError) -> Response {
    text(error.status(), &error.to_string())
}

/// Render a locally produced page.
pub fn render_page(page: PageResponse) -> Response {
    let mut response = Response::new(Body::from(page.body));
    *response.status_mut() = page.status;
    if let Some(content_type) = page.content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

pub fn text(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}

fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn internal_error(message: String) -> Response {
    text(StatusCode::INTERNAL_SERVER_ERROR, &message)
}
