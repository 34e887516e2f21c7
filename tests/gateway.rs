//! Gateway, observation and data-origin registration behavior.

mod common;

use axum::http::{Method, StatusCode};
use oxigraph::model::NamedNode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use url::Url;

use common::*;
use smart_service_proxy::backend::{
    BackendGateway, DataOrigin, ObservationSink, OriginGateway, RegistrationError, ResourceOutcome,
};
use smart_service_proxy::dispatch::{ProxyRequest, RegistryError};
use smart_service_proxy::rdf::{parse_graph, Language};

struct IgnoringSink;

impl ObservationSink for IgnoringSink {
    fn on_update(&self, _outcome: ResourceOutcome) {}
}

fn origin() -> Url {
    Url::parse("fake://origin/temperature").unwrap()
}

fn request() -> ProxyRequest {
    ProxyRequest::new(Url::parse("http://localhost:8080/fake").unwrap(), Method::GET)
}

fn proxy_config() -> smart_service_proxy::ProxyConfig {
    let mut config = test_config();
    config.coap.enabled = false;
    config
}

#[tokio::test]
async fn test_first_completion_wins() {
    let gateway = BackendGateway::new(FakeAdapter::new(FakeReply::RespondThenTimeout(FakeResponse::turtle(
        TEMPERATURE,
    ))));

    let outcome = gateway.forward(&request(), &origin()).await.unwrap();

    assert!(matches!(outcome, ResourceOutcome::Success { .. }));
}

#[tokio::test]
async fn test_every_request_completes() {
    let cases = [
        (FakeReply::Respond(FakeResponse::turtle(TEMPERATURE)), StatusCode::OK),
        (
            FakeReply::Respond(FakeResponse::without_content_type(TEMPERATURE)),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (FakeReply::Timeout, StatusCode::GATEWAY_TIMEOUT),
        (FakeReply::SendFails, StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (reply, expected) in cases {
        let gateway = Arc::new(BackendGateway::new(FakeAdapter::new(reply.clone())));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let gateway = Arc::clone(&gateway);
            tasks.push(tokio::spawn(async move { gateway.forward(&request(), &origin()).await }));
        }
        for task in tasks {
            let outcome = task.await.unwrap().unwrap();
            assert_eq!(outcome.status(), expected, "{reply:?}");
        }
    }
}

#[tokio::test]
async fn test_observe_twice_shares_one_subscription() {
    let adapter = FakeAdapter::new(FakeReply::Timeout);
    let observe_calls = Arc::clone(&adapter.observe_calls);
    let gateway = Arc::new(BackendGateway::new(adapter));

    let (origin_a, origin_b) = (origin(), origin());
    let (first, second) = tokio::join!(
        gateway.observe(&origin_a, Arc::new(IgnoringSink)),
        gateway.observe(&origin_b, Arc::new(IgnoringSink)),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(first.same_as(&second));
    assert_eq!(observe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.observation_count(), 1);

    let third = gateway.observe(&origin(), Arc::new(IgnoringSink)).await.unwrap();
    assert!(third.same_as(&first));
    assert_eq!(observe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unobserve_allows_a_new_subscription() {
    let adapter = FakeAdapter::new(FakeReply::Timeout);
    let observe_calls = Arc::clone(&adapter.observe_calls);
    let gateway = BackendGateway::new(adapter);

    let first = gateway.observe(&origin(), Arc::new(IgnoringSink)).await.unwrap();
    assert!(gateway.unobserve(&origin()));
    assert!(!first.is_active());
    assert!(!gateway.unobserve(&origin()));

    let second = gateway.observe(&origin(), Arc::new(IgnoringSink)).await.unwrap();
    assert!(!second.same_as(&first));
    assert_eq!(observe_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_remote_origin_is_served_from_cache_after_first_fetch() {
    let proxy = start_proxy(proxy_config()).await;
    let adapter = FakeAdapter::new(FakeReply::Respond(FakeResponse::turtle(TEMPERATURE)));
    let transmissions = Arc::clone(&adapter.transmissions);
    let gateway: Arc<dyn OriginGateway> = Arc::new(BackendGateway::new(adapter));

    let proxy_uri = proxy
        .registrar()
        .register_data_origin(DataOrigin::Remote {
            identifier: origin(),
            gateway,
            observe: false,
        })
        .await
        .unwrap();
    assert_eq!(proxy.registrar().proxy_uri(&origin()), Some(proxy_uri.clone()));

    let router = proxy.router();
    for _ in 0..3 {
        let response = get(&router, &request_target(&proxy_uri), Some("text/turtle")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(transmissions.lock().unwrap().len(), 1);

    let name = NamedNode::new(origin().as_str()).unwrap();
    assert!(proxy.registrar().updater().cache().contains_named_graph(&name).unwrap());
}

#[tokio::test]
async fn test_observed_origin_subscribes_once() {
    let proxy = start_proxy(proxy_config()).await;
    let adapter = FakeAdapter::new(FakeReply::Timeout);
    let observe_calls = Arc::clone(&adapter.observe_calls);
    let gateway: Arc<dyn OriginGateway> = Arc::new(BackendGateway::new(adapter));

    let proxy_uri = proxy
        .registrar()
        .register_data_origin(DataOrigin::Remote {
            identifier: origin(),
            gateway: Arc::clone(&gateway),
            observe: true,
        })
        .await
        .unwrap();
    gateway.observe(&origin(), Arc::new(IgnoringSink)).await.unwrap();

    assert_eq!(observe_calls.load(Ordering::SeqCst), 1);

    assert!(proxy.registrar().unregister_data_origin(&origin()).await);
    assert!(!proxy.registrar().unregister_data_origin(&origin()).await);
    assert!(!proxy.registry().contains(&proxy_uri));
    assert!(gateway.observe(&origin(), Arc::new(IgnoringSink)).await.is_ok());
    assert_eq!(observe_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_static_origin_registration() {
    let proxy = start_proxy(proxy_config()).await;
    let identifier = Url::parse("http://example.org/graphs/sensors").unwrap();
    let graph = parse_graph(TEMPERATURE.as_bytes(), Language::Turtle, None).unwrap();

    let proxy_uri = proxy
        .registrar()
        .register_data_origin(DataOrigin::Static {
            identifier: identifier.clone(),
            graph: graph.clone(),
        })
        .await
        .unwrap();
    assert_eq!(proxy_uri.query(), Some("graph=http%3A%2F%2Fexample.org%2Fgraphs%2Fsensors"));

    let response = get(&proxy.router(), &request_target(&proxy_uri), Some("text/turtle")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("expires").is_some());
    let body = body_string(response).await;
    assert_eq!(parse_graph(body.as_bytes(), Language::Turtle, None).unwrap(), graph);

    let error = proxy
        .registrar()
        .register_data_origin(DataOrigin::Static { identifier, graph })
        .await
        .unwrap_err();
    assert!(matches!(error, RegistrationError::Registry(RegistryError::AlreadyRegistered(_))));
}
