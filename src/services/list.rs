//! Listing of the registered proxy URIs.

use async_trait::async_trait;
use axum::http::{Method, StatusCode};

use crate::dispatch::{PageResponse, ProxyRequest, ServiceDirectory, WebPage};
use crate::rdf::negotiation::prefers;

const JSON: &str = "application/json";

pub struct ServiceList {
    directory: ServiceDirectory,
}

impl ServiceList {
    pub fn new(directory: ServiceDirectory) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl WebPage for ServiceList {
    async fn respond(&self, request: &ProxyRequest) -> PageResponse {
        if request.method() != Method::GET {
            return PageResponse::text(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Method {} is not allowed.", request.method()),
            );
        }

        let services: Vec<String> = self.directory.services().into_iter().map(String::from).collect();
        if prefers(request.accept(), JSON) {
            return match serde_json::to_vec(&services) {
                Ok(body) => PageResponse::ok(JSON, body),
                Err(e) => PageResponse::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            };
        }

        PageResponse::ok("text/html; charset=utf-8", render_html(&services))
    }
}

fn render_html(services: &[String]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Smart Service Proxy</title></head>\n<body>\n<h1>Registered services</h1>\n<ul>\n",
    );
    for service in services {
        let escaped = escape(service);
        html.push_str(&format!("<li><a href=\"{escaped}\">{escaped}</a></li>\n"));
    }
    html.push_str("</ul>\n</body>\n</html>\n");
    html
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
