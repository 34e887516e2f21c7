//! Built-in services and static files through the router.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use std::path::PathBuf;
use tower::ServiceExt;

use common::*;
use smart_service_proxy::config::schema::FileConfig;

fn proxy_config() -> smart_service_proxy::ProxyConfig {
    let mut config = test_config();
    config.coap.enabled = false;
    config
}

/// Write a Turtle file under a per-test name in the temp directory.
fn turtle_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("ssp-{}-{name}.ttl", std::process::id()));
    std::fs::write(&path, content).unwrap();
    path
}

fn sparql_form(query: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/sparql")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("query={}", urlencoding::encode(query))))
        .unwrap()
}

#[tokio::test]
async fn test_service_list_tracks_registrations() {
    let mut config = test_config();
    config.coap.origins = vec![smart_service_proxy::config::schema::CoapOriginConfig {
        uri: "coap://127.0.0.1:5683/sensors/temp".to_string(),
        observe: false,
    }];
    let proxy = start_proxy(config).await;
    let router = proxy.router();

    let response = get(&router, "/", Some("application/json")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("application/json"));
    let services: Vec<String> = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(services.contains(&"http://localhost:8080/".to_string()));
    assert!(services.contains(&"http://localhost:8080/favicon.ico".to_string()));
    assert!(services.contains(&"http://localhost:8080/sparql".to_string()));
    assert!(services.contains(&"http://localhost:8080/coap".to_string()));
    assert!(services
        .iter()
        .any(|service| service.ends_with("?uri=coap%3A%2F%2F127.0.0.1%3A5683%2Fsensors%2Ftemp")));

    let response = get(&router, "/", None).await;
    assert!(content_type(&response).unwrap().starts_with("text/html"));
    assert!(body_string(response).await.contains("/favicon.ico"));

    let response = send(&router, Method::POST, "/", None, Body::empty()).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_favicon() {
    let proxy = start_proxy(proxy_config()).await;

    let response = get(&proxy.router(), "/favicon.ico", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("image/x-icon"));
}

#[tokio::test]
async fn test_file_graph_is_served_and_queryable() {
    let path = turtle_file("sensors", TEMPERATURE);
    let mut config = proxy_config();
    config.files = vec![
        FileConfig {
            path: path.display().to_string(),
            graph: "http://example.org/graphs/sensors".to_string(),
        },
        FileConfig {
            path: "/does/not/exist.ttl".to_string(),
            graph: "http://example.org/graphs/missing".to_string(),
        },
    ];
    let proxy = start_proxy(config).await;
    let router = proxy.router();

    let response = get(
        &router,
        "/?graph=http%3A%2F%2Fexample.org%2Fgraphs%2Fsensors",
        Some("text/n3"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("text/n3"));
    assert!(body_string(response).await.contains("21"));

    let response = get(&router, "/?graph=http%3A%2F%2Fexample.org%2Fgraphs%2Fmissing", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let query = "SELECT ?g ?o WHERE { GRAPH ?g { ?s <http://example.org/temperature> ?o } }";
    let response = router.clone().oneshot(sparql_form(query)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("application/sparql-results+json"));
    let results: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let binding = &results["results"]["bindings"][0];
    assert_eq!(binding["g"]["value"], "http://example.org/graphs/sensors");
    assert_eq!(binding["o"]["value"], "21");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/sparql")
        .header(header::CONTENT_TYPE, "application/sparql-query")
        .header(header::ACCEPT, "text/turtle")
        .body(Body::from("CONSTRUCT { ?s ?p ?o } WHERE { GRAPH ?g { ?s ?p ?o } }"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response).as_deref(), Some("text/turtle"));

    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn test_sparql_rejects_bad_requests() {
    let proxy = start_proxy(proxy_config()).await;
    let router = proxy.router();

    let response = get(&router, "/sparql", None).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = send(&router, Method::POST, "/sparql", None, Body::empty()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router.clone().oneshot(sparql_form("SELEKT nothing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sparql_can_be_disabled() {
    let mut config = proxy_config();
    config.sparql.enabled = false;
    let proxy = start_proxy(config).await;

    let response = send(&proxy.router(), Method::POST, "/sparql", None, Body::empty()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_virtual_sensors_publish_query_results() {
    let path = turtle_file("rooms", TEMPERATURE);
    let mut config = proxy_config();
    config.files = vec![FileConfig {
        path: path.display().to_string(),
        graph: "http://example.org/graphs/rooms".to_string(),
    }];
    config.virtual_sensors.sensors = vec![smart_service_proxy::config::schema::VirtualSensorConfig {
        name: "max".to_string(),
        sensor_type: "http://example.org/MaxTemperatureSensor".to_string(),
        feature_of_interest: "http://example.org/building".to_string(),
        observed_property: "http://example.org/maxTemperature".to_string(),
        query: "SELECT (MAX(?t) AS ?val) WHERE { GRAPH ?g { ?s <http://example.org/temperature> ?t } }".to_string(),
    }];
    let proxy = start_proxy(config).await;
    let router = proxy.router();

    let response = get(&router, "/?graph=http%3A%2F%2Flocalhost%3A8080%2Fvs%23max", Some("text/turtle")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("http://purl.oclc.org/NET/ssnx/ssn#hasValue"), "{body}");
    assert!(body.contains("\"21\""), "{body}");

    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("sensorName", "count")
        .append_pair("sensorType", "http://example.org/CountingSensor")
        .append_pair("foi", "http://example.org/cache")
        .append_pair("property", "http://example.org/tripleCount")
        .append_pair("query", "SELECT (COUNT(*) AS ?val) WHERE { GRAPH ?g { ?s ?p ?o } }")
        .append_pair("button", "btnCreate")
        .finish();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/services/virtual-sensor-creation")
        .header(header::HOST, "localhost:8080")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(created["graphName"], "http://localhost:8080/vs#count");

    let response = get(&router, "/", Some("application/json")).await;
    let services: Vec<String> = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(services.contains(&"http://localhost:8080/services/virtual-sensor-creation".to_string()));
    assert!(services.iter().any(|service| service.ends_with("vs%23count")));

    let sensors = proxy.virtual_sensors().unwrap();
    assert_eq!(sensors.sensors().len(), 2);
    proxy.shutdown().await;
    assert!(sensors.sensors().is_empty());

    let _ = std::fs::remove_file(path);
}
