//! Shared utilities for integration testing.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tower::ServiceExt;
use url::Url;

use smart_service_proxy::backend::{
    prepare, ContentType, NativeRequest, NativeResponse, NativeStatus, ObservationHandle, ObservationSink,
    PreparedRequest, ProtocolAdapter, ResponseProcessor, TranslationError, TransmitError,
};
use smart_service_proxy::coap::option::{self, content_format};
use smart_service_proxy::coap::{CoapMessage, CoapOption, MessageCode, MessageType, Token};
use smart_service_proxy::dispatch::ProxyRequest;
use smart_service_proxy::lifecycle::WorkerPool;
use smart_service_proxy::{Proxy, ProxyConfig};

pub const TEMPERATURE: &str = "<http://example.org/sensor> <http://example.org/temperature> \"21\" .";

/// Configuration with fast CoAP timers and a loopback endpoint.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.coap.bind_address = "127.0.0.1:0".to_string();
    config.coap.ack_timeout_ms = 100;
    config.coap.ack_random_factor = 1.0;
    config.coap.max_retransmit = 2;
    config.coap.response_timeout_secs = 1;
    config.cache.expiry_grace_secs = 0;
    config.timeouts.request_secs = 5;
    config
}

/// Start a proxy whose workers share the test runtime.
pub async fn start_proxy(config: ProxyConfig) -> Proxy {
    Proxy::start(config, WorkerPool::current()).await.unwrap()
}

/// Drive one request through the router with all middleware.
pub async fn send(router: &Router, method: Method, path_and_query: &str, accept: Option<&str>, body: Body) -> Response {
    let mut request = Request::builder()
        .method(method)
        .uri(path_and_query)
        .header(header::HOST, "localhost:8080");
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }
    router.clone().oneshot(request.body(body).unwrap()).await.unwrap()
}

pub async fn get(router: &Router, path_and_query: &str, accept: Option<&str>) -> Response {
    send(router, Method::GET, path_and_query, accept, Body::empty()).await
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Path and query of the generic CoAP gateway for an origin.
pub fn generic_path(origin: &str) -> String {
    format!("/coap?uri={}", urlencoding::encode(origin))
}

/// Path and query of a proxy URI, as sent in a request line.
pub fn request_target(proxy_uri: &Url) -> String {
    match proxy_uri.query() {
        Some(query) => format!("{}?{}", proxy_uri.path(), query),
        None => proxy_uri.path().to_string(),
    }
}

/// Poll until `condition` holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ---------------------------------------------------------------------------
// Mock CoAP origin
// ---------------------------------------------------------------------------

type Handler = dyn Fn(&CoapMessage) -> Vec<CoapMessage> + Send + Sync;

/// UDP origin answering requests through a programmable handler.
///
/// Every request is recorded; empty ACK and RST messages from the proxy are
/// counted separately.
pub struct MockCoapServer {
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CoapMessage>>>,
    acks: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
    peer: Arc<Mutex<Option<SocketAddr>>>,
}

impl MockCoapServer {
    pub async fn start<F>(handler: F) -> MockCoapServer
    where
        F: Fn(&CoapMessage) -> Vec<CoapMessage> + Send + Sync + 'static,
    {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let server = MockCoapServer {
            socket: Arc::clone(&socket),
            addr,
            requests: Arc::new(Mutex::new(Vec::new())),
            acks: Arc::new(AtomicUsize::new(0)),
            resets: Arc::new(AtomicUsize::new(0)),
            peer: Arc::new(Mutex::new(None)),
        };

        let handler: Arc<Handler> = Arc::new(handler);
        let requests = Arc::clone(&server.requests);
        let acks = Arc::clone(&server.acks);
        let resets = Arc::clone(&server.resets);
        let peer = Arc::clone(&server.peer);
        tokio::spawn(async move {
            let mut buffer = vec![0u8; 2048];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buffer).await else {
                    break;
                };
                let Ok(message) = CoapMessage::decode(&buffer[..len]) else {
                    continue;
                };
                *peer.lock().unwrap() = Some(from);

                match message.message_type {
                    MessageType::Reset => {
                        resets.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    MessageType::Acknowledgement if message.code.is_empty() => {
                        acks.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    _ => {}
                }

                requests.lock().unwrap().push(message.clone());
                for reply in handler(&message) {
                    let datagram = reply.encode().unwrap();
                    let _ = socket.send_to(&datagram, from).await;
                }
            }
        });

        server
    }

    /// Origin that never answers.
    pub async fn silent() -> MockCoapServer {
        Self::start(|_| Vec::new()).await
    }

    pub fn uri(&self, path: &str) -> String {
        format!("coap://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<CoapMessage> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn ack_count(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Send an unsolicited message to the last peer, e.g. a notification.
    pub async fn push(&self, message: CoapMessage) {
        let peer = self.peer.lock().unwrap().expect("no peer yet");
        self.socket.send_to(&message.encode().unwrap(), peer).await.unwrap();
    }
}

/// Piggybacked 2.05 with a Turtle payload.
pub fn content(request: &CoapMessage, turtle: &str, max_age: Option<u32>) -> CoapMessage {
    let mut response = CoapMessage::new(
        MessageType::Acknowledgement,
        MessageCode::CONTENT,
        request.message_id,
        request.token,
    )
    .with_option(CoapOption::uint(option::CONTENT_FORMAT, u32::from(content_format::TURTLE)))
    .with_payload(turtle.as_bytes().to_vec());
    if let Some(max_age) = max_age {
        response.add_option(CoapOption::uint(option::MAX_AGE, max_age));
    }
    if let Some(sequence) = request.observe() {
        response.add_option(CoapOption::uint(option::OBSERVE, sequence + 1));
    }
    response
}

/// Piggybacked response with only a code and a diagnostic payload.
pub fn piggybacked(request: &CoapMessage, code: MessageCode, diagnostic: &str) -> CoapMessage {
    CoapMessage::new(MessageType::Acknowledgement, code, request.message_id, request.token)
        .with_payload(diagnostic.as_bytes().to_vec())
}

/// Non-confirmable notification for an observation.
pub fn notification(token: Token, message_id: u16, sequence: u32, turtle: &str, max_age: Option<u32>) -> CoapMessage {
    let mut message = CoapMessage::new(MessageType::NonConfirmable, MessageCode::CONTENT, message_id, token)
        .with_option(CoapOption::uint(option::OBSERVE, sequence))
        .with_option(CoapOption::uint(option::CONTENT_FORMAT, u32::from(content_format::TURTLE)))
        .with_payload(turtle.as_bytes().to_vec());
    if let Some(max_age) = max_age {
        message.add_option(CoapOption::uint(option::MAX_AGE, max_age));
    }
    message
}

// ---------------------------------------------------------------------------
// Fake protocol adapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeRequest {
    pub prepared: PreparedRequest,
}

impl NativeRequest for FakeRequest {
    fn target(&self) -> &Url {
        &self.prepared.origin
    }
}

#[derive(Debug, Clone)]
pub struct FakeResponse {
    pub status: NativeStatus,
    pub payload: Vec<u8>,
    pub content_type: ContentType,
    pub max_age: Option<Duration>,
}

impl FakeResponse {
    pub fn turtle(payload: &str) -> Self {
        Self {
            status: NativeStatus::Success(StatusCode::OK),
            payload: payload.as_bytes().to_vec(),
            content_type: ContentType::Rdf(smart_service_proxy::rdf::Language::Turtle),
            max_age: None,
        }
    }

    pub fn without_content_type(payload: &str) -> Self {
        Self {
            content_type: ContentType::Absent,
            ..Self::turtle(payload)
        }
    }
}

impl NativeResponse for FakeResponse {
    fn status(&self) -> NativeStatus {
        self.status
    }

    fn describe_status(&self) -> String {
        format!("{:?}", self.status)
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn content_type(&self) -> ContentType {
        self.content_type.clone()
    }

    fn max_age(&self) -> Option<Duration> {
        self.max_age
    }
}

/// What the fake transport does with each request.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Respond(FakeResponse),
    /// Response followed by a late timeout for the same request.
    RespondThenTimeout(FakeResponse),
    Timeout,
    SendFails,
}

/// Adapter for the `fake` scheme that records every request.
pub struct FakeAdapter {
    reply: FakeReply,
    pub transmissions: Arc<Mutex<Vec<PreparedRequest>>>,
    pub observe_calls: Arc<AtomicUsize>,
}

impl FakeAdapter {
    pub fn new(reply: FakeReply) -> Self {
        Self {
            reply,
            transmissions: Arc::new(Mutex::new(Vec::new())),
            observe_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for FakeAdapter {
    type Request = FakeRequest;

    fn scheme(&self) -> &'static str {
        "fake"
    }

    fn translate(&self, request: &ProxyRequest, origin: &Url) -> Result<FakeRequest, TranslationError> {
        Ok(FakeRequest {
            prepared: prepare(request, origin, "fake")?,
        })
    }

    async fn transmit(&self, request: FakeRequest, processor: Arc<ResponseProcessor>) -> Result<(), TransmitError> {
        if let FakeReply::SendFails = self.reply {
            return Err(TransmitError::Closed);
        }
        self.transmissions.lock().unwrap().push(request.prepared);

        let reply = self.reply.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            match reply {
                FakeReply::Respond(response) => {
                    processor.on_native_response(&response);
                }
                FakeReply::RespondThenTimeout(response) => {
                    processor.on_native_response(&response);
                    processor.on_timeout();
                }
                FakeReply::Timeout => {
                    processor.on_timeout();
                }
                FakeReply::SendFails => {}
            }
        });
        Ok(())
    }

    fn supports_observation(&self) -> bool {
        true
    }

    async fn observe(&self, _origin: &Url, _sink: Arc<dyn ObservationSink>) -> Result<ObservationHandle, TransmitError> {
        self.observe_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(ObservationHandle::new(|| {}))
    }

    async fn shutdown(&self) {}
}
