//! CoAP client endpoint over a single UDP socket.
//!
//! # Responsibilities
//! - Assign tokens and message ids, keep one exchange per token
//! - Retransmit confirmable requests with exponential back-off
//! - Match piggybacked, separate and non-confirmable responses
//! - Acknowledge separate responses and their duplicates, reject unknown
//!   ones with RST
//! - Deliver observe notifications in freshness order
//!
//! Every exchange completes exactly once: the entry is removed from the
//! exchange map before its callback runs, so whoever removes it owns the
//! completion.

use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::{Host, Url};

use super::code::MessageType;
use super::message::{CoapMessage, Token};
use super::option::{self, CoapOption};
use super::reliability::TransmissionParameters;
use crate::backend::TransmitError;
use crate::observability::metrics;

const MAX_DATAGRAM_SIZE: usize = 1152 * 2;

/// Notifications older than this no longer compete on sequence numbers.
const FRESHNESS_WINDOW: Duration = Duration::from_secs(128);
const SEQUENCE_WINDOW: u32 = 1 << 23;

/// How long an acknowledged confirmable response is remembered, so that
/// its retransmissions get the same ACK (EXCHANGE_LIFETIME, RFC 7252
/// section 4.8.2).
const DUPLICATE_WINDOW: Duration = Duration::from_secs(247);

/// Receiver of the single outcome of one request.
pub trait ResponseCallback: Send + Sync + 'static {
    fn on_response(&self, response: CoapMessage);

    /// No acknowledgement after the last retransmission, or no separate
    /// response within the response timeout.
    fn on_timeout(&self);

    fn on_reset(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationEnd {
    Timeout,
    Reset,
    /// The origin answered without an Observe option or with an error.
    NotObservable,
    Cancelled,
    Shutdown,
}

/// Receiver of the notifications of one observation.
pub trait NotificationCallback: Send + Sync + 'static {
    fn on_notification(&self, notification: CoapMessage);

    fn on_observation_ended(&self, reason: ObservationEnd);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangePhase {
    Sent,
    Acknowledged,
}

struct Exchange {
    remote: SocketAddr,
    message_id: u16,
    callback: Arc<dyn ResponseCallback>,
    /// Dropped together with the exchange, which ends its supervisor.
    phase: watch::Sender<ExchangePhase>,
}

struct Observation {
    remote: SocketAddr,
    callback: Arc<dyn NotificationCallback>,
    freshness: Mutex<Option<(u32, Instant)>>,
}

impl Observation {
    /// RFC 7641 section 3.4 ordering. Records the sequence when fresh.
    fn accept(&self, sequence: u32) -> bool {
        let mut last = self.freshness.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        let fresh = match *last {
            None => true,
            Some((previous, received)) => {
                (previous < sequence && sequence - previous < SEQUENCE_WINDOW)
                    || (previous > sequence && previous - sequence > SEQUENCE_WINDOW)
                    || now > received + FRESHNESS_WINDOW
            }
        };
        if fresh {
            *last = Some((sequence, now));
        }
        fresh
    }
}

/// Handle to a client endpoint. Clones share the socket.
#[derive(Clone)]
pub struct CoapClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    parameters: TransmissionParameters,
    runtime: Handle,
    exchanges: DashMap<Token, Exchange>,
    acks: DashMap<(SocketAddr, u16), Token>,
    acknowledged: DashMap<(SocketAddr, u16), Instant>,
    observations: DashMap<Token, Arc<Observation>>,
    next_message_id: AtomicU16,
    closed: AtomicBool,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl CoapClient {
    /// Bind the endpoint and start its receive task on the current runtime.
    pub async fn bind(addr: SocketAddr, parameters: TransmissionParameters) -> std::io::Result<CoapClient> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;
        let inner = Arc::new(ClientInner {
            socket,
            local_addr,
            parameters,
            runtime: Handle::current(),
            exchanges: DashMap::new(),
            acks: DashMap::new(),
            acknowledged: DashMap::new(),
            observations: DashMap::new(),
            next_message_id: AtomicU16::new(rand::random()),
            closed: AtomicBool::new(false),
            receiver: Mutex::new(None),
        });

        let receiver = tokio::spawn(ClientInner::receive_loop(
            Arc::clone(&inner.socket),
            Arc::downgrade(&inner),
        ));
        *inner.receiver.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(receiver);

        tracing::info!(address = %local_addr, "CoAP endpoint bound");
        Ok(CoapClient { inner })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn parameters(&self) -> &TransmissionParameters {
        &self.inner.parameters
    }

    /// Send a request. The callback fires exactly once, unless this
    /// returns `Err`, in which case nothing was sent and it never fires.
    pub async fn send(
        &self,
        remote: SocketAddr,
        request: CoapMessage,
        callback: Arc<dyn ResponseCallback>,
    ) -> Result<Token, TransmitError> {
        self.inner.transmit(remote, request, Token::random(), callback).await
    }

    /// Register an observation (GET with Observe=0).
    pub async fn observe(
        &self,
        remote: SocketAddr,
        mut request: CoapMessage,
        callback: Arc<dyn NotificationCallback>,
    ) -> Result<Token, TransmitError> {
        let remote = self.inner.map_remote(remote)?;
        let token = Token::random();
        request.remove_options(option::OBSERVE);
        request.add_option(CoapOption::uint(option::OBSERVE, 0));

        self.inner.observations.insert(
            token,
            Arc::new(Observation {
                remote,
                callback,
                freshness: Mutex::new(None),
            }),
        );
        let start = Arc::new(ObservationStart {
            client: Arc::downgrade(&self.inner),
            token,
        });
        if let Err(e) = self.inner.transmit(remote, request, token, start).await {
            self.inner.observations.remove(&token);
            return Err(e);
        }

        tracing::debug!(remote = %remote, token = %token, "Observation requested");
        Ok(token)
    }

    /// Forget an observation. Its next notification is answered with RST.
    pub fn cancel_observation(&self, token: Token) -> bool {
        self.inner.take_exchange(&token);
        self.inner.end_observation(token, ObservationEnd::Cancelled)
    }

    pub fn pending_exchanges(&self) -> usize {
        self.inner.exchanges.len()
    }

    pub fn observation_count(&self) -> usize {
        self.inner.observations.len()
    }

    /// Stop receiving and complete everything that is still open.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let receiver = self
            .inner
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(receiver) = receiver {
            receiver.abort();
        }

        let tokens: Vec<Token> = self.inner.exchanges.iter().map(|entry| *entry.key()).collect();
        for token in &tokens {
            self.inner.time_out(token);
        }
        let observations: Vec<Token> = self.inner.observations.iter().map(|entry| *entry.key()).collect();
        for token in observations {
            self.inner.end_observation(token, ObservationEnd::Shutdown);
        }

        tracing::info!(address = %self.inner.local_addr, pending = tokens.len(), "CoAP endpoint shut down");
    }
}

impl ClientInner {
    fn next_message_id(&self) -> u16 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Bring the destination into the socket's address family.
    fn map_remote(&self, remote: SocketAddr) -> Result<SocketAddr, TransmitError> {
        match (self.local_addr.ip(), remote.ip()) {
            (IpAddr::V6(_), IpAddr::V4(ip)) => Ok(SocketAddr::new(IpAddr::V6(ip.to_ipv6_mapped()), remote.port())),
            (IpAddr::V4(_), IpAddr::V6(ip)) => ip
                .to_ipv4_mapped()
                .map(|ip| SocketAddr::new(IpAddr::V4(ip), remote.port()))
                .ok_or(TransmitError::Unreachable(remote)),
            _ => Ok(remote),
        }
    }

    async fn transmit(
        self: &Arc<Self>,
        remote: SocketAddr,
        mut request: CoapMessage,
        token: Token,
        callback: Arc<dyn ResponseCallback>,
    ) -> Result<Token, TransmitError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransmitError::Closed);
        }
        let remote = self.map_remote(remote)?;

        request.token = token;
        request.message_id = self.next_message_id();
        let datagram = request.encode().map_err(|e| TransmitError::Encode(e.to_string()))?;
        let confirmable = request.is_confirmable();

        let (phase, watcher) = watch::channel(ExchangePhase::Sent);
        self.exchanges.insert(
            token,
            Exchange {
                remote,
                message_id: request.message_id,
                callback,
                phase,
            },
        );
        if confirmable {
            self.acks.insert((remote, request.message_id), token);
        }

        if let Err(e) = self.socket.send_to(&datagram, remote).await {
            self.take_exchange(&token);
            tracing::warn!(remote = %remote, token = %token, error = %e, "Failed to send CoAP request");
            return Err(e.into());
        }

        tracing::debug!(
            remote = %remote,
            token = %token,
            mid = request.message_id,
            code = %request.code,
            confirmable,
            "Sent CoAP request"
        );
        self.runtime
            .spawn(Self::supervise(Arc::clone(self), token, datagram, remote, confirmable, watcher));
        Ok(token)
    }

    /// Retransmit until acknowledged, then bound the wait for the response.
    async fn supervise(
        self: Arc<Self>,
        token: Token,
        datagram: Vec<u8>,
        remote: SocketAddr,
        confirmable: bool,
        mut phase: watch::Receiver<ExchangePhase>,
    ) {
        if confirmable {
            let initial = self.parameters.initial_timeout();
            let mut retransmissions = 0;
            loop {
                let timeout = TransmissionParameters::backoff(initial, retransmissions);
                match tokio::time::timeout(timeout, phase.changed()).await {
                    Ok(Ok(())) => break,
                    Ok(Err(_)) => return,
                    Err(_) if retransmissions >= self.parameters.max_retransmit => {
                        tracing::debug!(remote = %remote, token = %token, "No acknowledgement, giving up");
                        self.time_out(&token);
                        return;
                    }
                    Err(_) => {
                        retransmissions += 1;
                        metrics::record_retransmission();
                        tracing::debug!(remote = %remote, token = %token, attempt = retransmissions, "Retransmitting");
                        if let Err(e) = self.socket.send_to(&datagram, remote).await {
                            tracing::warn!(remote = %remote, token = %token, error = %e, "Retransmission failed");
                        }
                    }
                }
            }
        }

        let completed = async { while phase.changed().await.is_ok() {} };
        if tokio::time::timeout(self.parameters.response_timeout, completed)
            .await
            .is_err()
        {
            tracing::debug!(remote = %remote, token = %token, "No response within the response timeout");
            self.time_out(&token);
        }
    }

    fn take_exchange(&self, token: &Token) -> Option<Exchange> {
        let (_, exchange) = self.exchanges.remove(token)?;
        self.acks.remove(&(exchange.remote, exchange.message_id));
        Some(exchange)
    }

    fn time_out(&self, token: &Token) {
        if let Some(exchange) = self.take_exchange(token) {
            exchange.callback.on_timeout();
        }
    }

    fn end_observation(&self, token: Token, reason: ObservationEnd) -> bool {
        let Some((_, observation)) = self.observations.remove(&token) else {
            return false;
        };
        tracing::debug!(remote = %observation.remote, token = %token, ?reason, "Observation ended");
        observation.callback.on_observation_ended(reason);
        true
    }

    async fn reply(&self, message: CoapMessage, remote: SocketAddr) {
        let datagram = match message.encode() {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode reply");
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&datagram, remote).await {
            tracing::debug!(remote = %remote, error = %e, "Failed to send reply");
        }
    }

    /// Holds the client only while handling a datagram, so dropping the
    /// last handle stops the loop (see the `Drop` impl).
    async fn receive_loop(socket: Arc<UdpSocket>, client: Weak<ClientInner>) {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let received = socket.recv_from(&mut buffer).await;
            let Some(inner) = client.upgrade() else {
                return;
            };
            let (length, remote) = match received {
                Ok(received) => received,
                Err(e) => {
                    if inner.closed.load(Ordering::SeqCst) {
                        return;
                    }
                    tracing::debug!(error = %e, "CoAP receive failed");
                    continue;
                }
            };

            match CoapMessage::decode(&buffer[..length]) {
                Ok(message) => inner.handle(message, remote).await,
                Err(e) => tracing::debug!(remote = %remote, error = %e, "Dropping malformed datagram"),
            }
        }
    }

    async fn handle(&self, message: CoapMessage, remote: SocketAddr) {
        match message.message_type {
            MessageType::Acknowledgement if message.code.is_empty() => {
                let Some((_, token)) = self.acks.remove(&(remote, message.message_id)) else {
                    return;
                };
                if let Some(exchange) = self.exchanges.get(&token) {
                    exchange.phase.send_replace(ExchangePhase::Acknowledged);
                }
                tracing::debug!(remote = %remote, token = %token, "Request acknowledged, awaiting separate response");
            }
            MessageType::Reset => {
                let Some(token) = self.acks.get(&(remote, message.message_id)).map(|entry| *entry.value()) else {
                    return;
                };
                if let Some(exchange) = self.take_exchange(&token) {
                    tracing::debug!(remote = %remote, token = %token, "Request rejected with RST");
                    exchange.callback.on_reset();
                }
            }
            MessageType::Confirmable if message.code.is_empty() => {
                self.reply(CoapMessage::reset(message.message_id), remote).await;
            }
            _ if message.code.is_response() => self.handle_response(message, remote).await,
            _ => {
                if message.is_confirmable() {
                    self.reply(CoapMessage::reset(message.message_id), remote).await;
                }
            }
        }
    }

    /// ACK a confirmable response and remember it for its duplicates.
    async fn acknowledge(&self, message_id: u16, remote: SocketAddr) {
        self.acknowledged.retain(|_, at| at.elapsed() < DUPLICATE_WINDOW);
        self.acknowledged.insert((remote, message_id), Instant::now());
        self.reply(CoapMessage::acknowledgement(message_id), remote).await;
    }

    fn is_duplicate(&self, message: &CoapMessage, remote: SocketAddr) -> bool {
        message.is_confirmable()
            && self
                .acknowledged
                .get(&(remote, message.message_id))
                .map(|at| at.elapsed() < DUPLICATE_WINDOW)
                .unwrap_or(false)
    }

    async fn handle_response(&self, message: CoapMessage, remote: SocketAddr) {
        if self.is_duplicate(&message, remote) {
            tracing::debug!(remote = %remote, mid = message.message_id, "Acknowledging duplicate response");
            self.reply(CoapMessage::acknowledgement(message.message_id), remote).await;
            return;
        }

        let token = message.token;
        let matches_exchange = self
            .exchanges
            .get(&token)
            .map(|exchange| {
                exchange.remote == remote
                    && (message.message_type != MessageType::Acknowledgement
                        || exchange.message_id == message.message_id)
            })
            .unwrap_or(false);

        if matches_exchange {
            if message.is_confirmable() {
                self.acknowledge(message.message_id, remote).await;
            }
            if let Some(exchange) = self.take_exchange(&token) {
                tracing::debug!(remote = %remote, token = %token, code = %message.code, "Received CoAP response");
                exchange.callback.on_response(message);
            }
            return;
        }

        let observed = self
            .observations
            .get(&token)
            .map(|observation| observation.remote == remote)
            .unwrap_or(false);
        if observed {
            if message.is_confirmable() {
                self.acknowledge(message.message_id, remote).await;
            }
            self.deliver_notification(token, message);
            return;
        }

        if message.message_type != MessageType::Acknowledgement {
            tracing::debug!(remote = %remote, token = %token, "Rejecting unexpected response");
            self.reply(CoapMessage::reset(message.message_id), remote).await;
        }
    }

    fn deliver_notification(&self, token: Token, notification: CoapMessage) {
        let Some(observation) = self.observations.get(&token).map(|entry| Arc::clone(entry.value())) else {
            return;
        };

        let sequence = notification.observe();
        let success = notification.code.is_success();
        if let (true, Some(sequence)) = (success, sequence) {
            if !observation.accept(sequence) {
                tracing::debug!(token = %token, sequence, "Dropping stale notification");
                return;
            }
        }

        observation.callback.on_notification(notification);
        if !success || sequence.is_none() {
            self.end_observation(token, ObservationEnd::NotObservable);
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let receiver = self
            .receiver
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(receiver) = receiver {
            receiver.abort();
        }
    }
}

/// Completes the registration exchange of an observation.
struct ObservationStart {
    client: Weak<ClientInner>,
    token: Token,
}

impl ResponseCallback for ObservationStart {
    fn on_response(&self, response: CoapMessage) {
        if let Some(client) = self.client.upgrade() {
            client.deliver_notification(self.token, response);
        }
    }

    fn on_timeout(&self) {
        if let Some(client) = self.client.upgrade() {
            client.end_observation(self.token, ObservationEnd::Timeout);
        }
    }

    fn on_reset(&self) {
        if let Some(client) = self.client.upgrade() {
            client.end_observation(self.token, ObservationEnd::Reset);
        }
    }
}

/// Socket address of a `coap://` URI.
pub async fn resolve(uri: &Url) -> Result<SocketAddr, TransmitError> {
    let port = uri.port().unwrap_or(option::DEFAULT_PORT);
    match uri.host() {
        Some(Host::Ipv4(ip)) => Ok(SocketAddr::new(IpAddr::V4(ip), port)),
        Some(Host::Ipv6(ip)) => Ok(SocketAddr::new(IpAddr::V6(ip), port)),
        Some(Host::Domain(domain)) => tokio::net::lookup_host((domain, port))
            .await
            .map_err(|e| TransmitError::Unresolvable {
                host: domain.to_string(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| TransmitError::Unresolvable {
                host: domain.to_string(),
                reason: "no addresses".to_string(),
            }),
        None => Err(TransmitError::Unresolvable {
            host: String::new(),
            reason: format!("{uri} has no host"),
        }),
    }
}
