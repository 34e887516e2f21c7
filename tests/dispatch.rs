//! Dispatch behavior through the router and the dispatcher.

mod common;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use bytes::Bytes;
use oxigraph::model::Graph;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

use common::*;
use smart_service_proxy::backend::{BackendGateway, GatewayService, ResourceOutcome, TargetResolution};
use smart_service_proxy::dispatch::{DispatchError, Processor, ProxyRequest, RegistryError, SemanticProcessor};
use smart_service_proxy::rdf::{parse_graph, Language};

struct FixedOutcome {
    graph: Graph,
    expiry: SystemTime,
}

#[async_trait]
impl SemanticProcessor for FixedOutcome {
    async fn process(&self, _request: &ProxyRequest) -> Result<ResourceOutcome, DispatchError> {
        Ok(ResourceOutcome::Success {
            graph: self.graph.clone(),
            expiry: self.expiry,
        })
    }
}

struct Panicking;

#[async_trait]
impl SemanticProcessor for Panicking {
    async fn process(&self, _request: &ProxyRequest) -> Result<ResourceOutcome, DispatchError> {
        panic!("processor bug");
    }
}

struct Stalled;

#[async_trait]
impl SemanticProcessor for Stalled {
    async fn process(&self, _request: &ProxyRequest) -> Result<ResourceOutcome, DispatchError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(DispatchError::Internal("unreachable".to_string()))
    }
}

fn proxy_config() -> smart_service_proxy::ProxyConfig {
    let mut config = test_config();
    config.coap.enabled = false;
    config
}

fn temperature_graph() -> Graph {
    parse_graph(TEMPERATURE.as_bytes(), Language::Turtle, None).unwrap()
}

fn register(proxy: &smart_service_proxy::Proxy, path: &str, processor: Processor) -> Url {
    let uri = Url::parse(&format!("http://localhost:8080{path}")).unwrap();
    proxy.registry().register(uri.clone(), processor).unwrap();
    uri
}

/// Fake gateway under `/fake`, with a handle on what it transmitted.
fn register_fake(
    proxy: &smart_service_proxy::Proxy,
    reply: FakeReply,
) -> Arc<std::sync::Mutex<Vec<smart_service_proxy::backend::PreparedRequest>>> {
    let adapter = FakeAdapter::new(reply);
    let transmissions = Arc::clone(&adapter.transmissions);
    let service = GatewayService::new(
        Arc::new(BackendGateway::new(adapter)),
        TargetResolution::Fixed(Url::parse("fake://origin/temperature").unwrap()),
        proxy.registrar().updater().clone(),
    );
    register(proxy, "/fake", Processor::Semantic(Arc::new(service)));
    transmissions
}

#[tokio::test]
async fn test_unregistered_uri_is_404_without_backend_call() {
    let proxy = start_proxy(proxy_config()).await;
    let transmissions = register_fake(&proxy, FakeReply::Respond(FakeResponse::turtle(TEMPERATURE)));

    let response = get(&proxy.router(), "/nothing/here", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(transmissions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_success_renders_default_rdf_xml_with_expires() {
    let proxy = start_proxy(proxy_config()).await;
    let expiry = UNIX_EPOCH + Duration::from_secs(2_000_000_000);
    register(
        &proxy,
        "/sensor",
        Processor::Semantic(Arc::new(FixedOutcome {
            graph: temperature_graph(),
            expiry,
        })),
    );

    let response = get(&proxy.router(), "/sensor", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("application/rdf+xml"));
    assert_eq!(
        response.headers().get(header::EXPIRES).unwrap().to_str().unwrap(),
        httpdate::fmt_http_date(expiry)
    );
    let body = body_string(response).await;
    let graph = parse_graph(body.as_bytes(), Language::RdfXml, None).unwrap();
    assert_eq!(graph, temperature_graph());
}

#[tokio::test]
async fn test_success_renders_requested_language() {
    let proxy = start_proxy(proxy_config()).await;
    register(
        &proxy,
        "/sensor",
        Processor::Semantic(Arc::new(FixedOutcome {
            graph: temperature_graph(),
            expiry: SystemTime::now() + Duration::from_secs(60),
        })),
    );

    let response = get(&proxy.router(), "/sensor", Some("application/json, text/turtle;q=0.9")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("text/turtle"));
    let body = body_string(response).await;
    assert_eq!(parse_graph(body.as_bytes(), Language::Turtle, None).unwrap(), temperature_graph());
}

#[tokio::test]
async fn test_trace_is_405_without_backend_call() {
    let proxy = start_proxy(proxy_config()).await;
    let transmissions = register_fake(&proxy, FakeReply::Respond(FakeResponse::turtle(TEMPERATURE)));

    let response = send(&proxy.router(), Method::TRACE, "/fake", None, Body::empty()).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(transmissions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_put_keeps_body_and_get_drops_it() {
    let proxy = start_proxy(proxy_config()).await;
    let transmissions = register_fake(&proxy, FakeReply::Respond(FakeResponse::turtle(TEMPERATURE)));
    let router = proxy.router();

    let put = Request::builder()
        .method(Method::PUT)
        .uri("/fake")
        .header(header::CONTENT_TYPE, "text/turtle")
        .body(Bytes::from_static(b"hello"))
        .unwrap();
    let response = proxy.dispatcher().dispatch(put).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&router, Method::GET, "/fake", None, Body::from("hello")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let sent = transmissions.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].payload.as_deref(), Some(&b"hello"[..]));
    assert_eq!(sent[0].payload_language, Some(Language::Turtle));
    assert!(sent[1].payload.is_none());
}

#[tokio::test]
async fn test_missing_content_type_is_500() {
    let proxy = start_proxy(proxy_config()).await;
    register_fake(&proxy, FakeReply::Respond(FakeResponse::without_content_type("0123456789")));

    let response = get(&proxy.router(), "/fake", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response).await.contains("no content type option"));
}

#[tokio::test]
async fn test_transport_timeout_is_504() {
    let proxy = start_proxy(proxy_config()).await;
    register_fake(&proxy, FakeReply::Timeout);

    let response = get(&proxy.router(), "/fake", None).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_request_timeout_is_504() {
    let mut config = proxy_config();
    config.timeouts.request_secs = 1;
    let proxy = start_proxy(config).await;
    register(&proxy, "/stalled", Processor::Semantic(Arc::new(Stalled)));

    let response = get(&proxy.router(), "/stalled", None).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_send_failure_is_500() {
    let proxy = start_proxy(proxy_config()).await;
    register_fake(&proxy, FakeReply::SendFails);

    let response = get(&proxy.router(), "/fake", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response).await.contains("Could not send request"));
}

#[tokio::test]
async fn test_every_request_gets_a_response() {
    let proxy = start_proxy(proxy_config()).await;
    register(&proxy, "/broken", Processor::Semantic(Arc::new(Panicking)));
    let router = proxy.router();

    let cases = [
        ("/broken", StatusCode::INTERNAL_SERVER_ERROR),
        ("/unknown", StatusCode::NOT_FOUND),
        ("/a/../unknown?x=1", StatusCode::NOT_FOUND),
        ("/?graph=urn%3Amissing", StatusCode::NOT_FOUND),
        ("/", StatusCode::OK),
        ("/favicon.ico", StatusCode::OK),
    ];
    for (target, status) in cases {
        let response = get(&router, target, None).await;
        assert_eq!(response.status(), status, "{target}");
    }

    for method in [Method::GET, Method::POST, Method::DELETE, Method::PATCH, Method::OPTIONS] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/broken")
            .body(Bytes::new())
            .unwrap();
        let response = proxy.dispatcher().dispatch(request).await;
        assert!(response.status().is_server_error(), "{method}");
    }
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let mut config = proxy_config();
    config.security.max_body_size = 16;
    let proxy = start_proxy(config).await;
    let transmissions = register_fake(&proxy, FakeReply::Respond(FakeResponse::turtle(TEMPERATURE)));

    let response = send(&proxy.router(), Method::PUT, "/fake", None, Body::from(vec![b'x'; 64])).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(transmissions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let proxy = start_proxy(proxy_config()).await;
    let uri = register(&proxy, "/sensor", Processor::Semantic(Arc::new(Panicking)));

    let error = proxy
        .registry()
        .register(uri.clone(), Processor::Semantic(Arc::new(Panicking)))
        .unwrap_err();
    assert!(matches!(error, RegistryError::AlreadyRegistered(existing) if existing == uri));

    // Built-in services are taken too.
    let root = Url::parse("http://localhost:8080/").unwrap();
    assert!(proxy
        .registry()
        .register(root, Processor::Semantic(Arc::new(Panicking)))
        .is_err());
}
