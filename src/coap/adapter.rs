//! CoAP implementation of the back-end capability trait.

use async_trait::async_trait;
use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;
use url::{Host, Url};

use super::client::{self, CoapClient, NotificationCallback, ObservationEnd, ResponseCallback};
use super::code::{MessageCode, MessageType};
use super::message::{CoapMessage, Token};
use super::option::{self, CoapOption};
use crate::backend::{
    normalize_response, prepare, ContentType, NativeRequest, NativeResponse, NativeStatus, ObservationHandle,
    ObservationSink, PreparedRequest, ProtocolAdapter, RequestMethod, ResponseProcessor, TranslationError,
    TransmitError,
};
use crate::dispatch::ProxyRequest;

pub const SCHEME: &str = "coap";

/// A translated request, ready for the client endpoint.
#[derive(Debug, Clone)]
pub struct CoapRequest {
    origin: Url,
    message: CoapMessage,
}

impl CoapRequest {
    pub fn message(&self) -> &CoapMessage {
        &self.message
    }
}

impl NativeRequest for CoapRequest {
    fn target(&self) -> &Url {
        &self.origin
    }
}

impl NativeResponse for CoapMessage {
    fn status(&self) -> NativeStatus {
        let status = self.code.to_http_status();
        if self.code.is_success() {
            NativeStatus::Success(status)
        } else {
            NativeStatus::Error(status)
        }
    }

    fn describe_status(&self) -> String {
        self.code.to_string()
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn content_type(&self) -> ContentType {
        match self.content_format() {
            None => ContentType::Absent,
            Some(format) => option::language_for(format)
                .map(ContentType::Rdf)
                .unwrap_or_else(|| ContentType::Unsupported(option::describe_format(format))),
        }
    }

    fn max_age(&self) -> Option<Duration> {
        CoapMessage::max_age(self)
    }
}

/// Encode a prepared request as a CoAP message. Token and message id are
/// assigned by the client on send.
pub fn build_message(prepared: &PreparedRequest, confirmable: bool) -> CoapMessage {
    let code = match prepared.method {
        RequestMethod::Get => MessageCode::GET,
        RequestMethod::Post => MessageCode::POST,
        RequestMethod::Put => MessageCode::PUT,
        RequestMethod::Delete => MessageCode::DELETE,
    };
    let message_type = if confirmable {
        MessageType::Confirmable
    } else {
        MessageType::NonConfirmable
    };
    let mut message = CoapMessage::new(message_type, code, 0, Token::default());
    let origin = &prepared.origin;

    if let Some(Host::Domain(domain)) = origin.host() {
        message.add_option(CoapOption::string(option::URI_HOST, domain));
    }
    if let Some(port) = origin.port().filter(|port| *port != option::DEFAULT_PORT) {
        message.add_option(CoapOption::uint(option::URI_PORT, u32::from(port)));
    }
    if origin.path() != "/" {
        for segment in origin.path_segments().into_iter().flatten() {
            message.add_option(CoapOption::string(option::URI_PATH, &percent_decode(segment)));
        }
    }
    for argument in origin.query().into_iter().flat_map(|query| query.split('&')) {
        if !argument.is_empty() {
            message.add_option(CoapOption::string(option::URI_QUERY, &percent_decode(argument)));
        }
    }
    for language in prepared.accept {
        message.add_option(CoapOption::uint(option::ACCEPT, u32::from(option::format_for(language))));
    }
    if let Some(payload) = &prepared.payload {
        if let Some(language) = prepared.payload_language {
            message.add_option(CoapOption::uint(option::CONTENT_FORMAT, u32::from(option::format_for(language))));
        }
        message.payload = payload.to_vec();
    }
    message
}

fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Completes a response processor from client events.
struct ProcessorCallback(Arc<ResponseProcessor>);

impl ResponseCallback for ProcessorCallback {
    fn on_response(&self, response: CoapMessage) {
        self.0.on_native_response(&response);
    }

    fn on_timeout(&self) {
        self.0.on_timeout();
    }

    fn on_reset(&self) {
        self.0.on_reset();
    }
}

/// Normalizes notifications and hands them to an observation sink.
struct ObservationForwarder {
    resource: Url,
    sink: Arc<dyn ObservationSink>,
}

impl NotificationCallback for ObservationForwarder {
    fn on_notification(&self, notification: CoapMessage) {
        tracing::debug!(
            resource = %self.resource,
            code = %notification.code,
            sequence = notification.observe(),
            "Received notification"
        );
        self.sink.on_update(normalize_response(&self.resource, &notification));
    }

    fn on_observation_ended(&self, reason: ObservationEnd) {
        tracing::info!(resource = %self.resource, ?reason, "Observation ended");
        self.sink.on_closed();
    }
}

pub struct CoapAdapter {
    client: CoapClient,
    confirmable: bool,
}

impl CoapAdapter {
    pub fn new(client: CoapClient, confirmable: bool) -> Self {
        Self { client, confirmable }
    }

    pub fn client(&self) -> &CoapClient {
        &self.client
    }
}

#[async_trait]
impl ProtocolAdapter for CoapAdapter {
    type Request = CoapRequest;

    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn translate(&self, request: &ProxyRequest, origin: &Url) -> Result<CoapRequest, TranslationError> {
        let prepared = prepare(request, origin, SCHEME)?;
        Ok(CoapRequest {
            origin: prepared.origin.clone(),
            message: build_message(&prepared, self.confirmable),
        })
    }

    async fn transmit(&self, request: CoapRequest, processor: Arc<ResponseProcessor>) -> Result<(), TransmitError> {
        let remote = client::resolve(&request.origin).await?;
        self.client
            .send(remote, request.message, Arc::new(ProcessorCallback(processor)))
            .await
            .map(|_| ())
    }

    fn supports_observation(&self) -> bool {
        true
    }

    async fn observe(&self, origin: &Url, sink: Arc<dyn ObservationSink>) -> Result<ObservationHandle, TransmitError> {
        let request = ProxyRequest::new(origin.clone(), Method::GET);
        let prepared = prepare(&request, origin, SCHEME).map_err(|e| TransmitError::Encode(e.to_string()))?;
        let message = build_message(&prepared, self.confirmable);
        let remote = client::resolve(origin).await?;

        let forwarder = Arc::new(ObservationForwarder {
            resource: origin.clone(),
            sink,
        });
        let token = self.client.observe(remote, message, forwarder).await?;

        let client = self.client.clone();
        Ok(ObservationHandle::new(move || {
            client.cancel_observation(token);
        }))
    }

    async fn shutdown(&self) {
        self.client.shutdown();
    }
}
