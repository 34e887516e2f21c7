//! CoAP back-end (RFC 7252, observation per RFC 7641).
//!
//! # Data Flow
//! ```text
//! PreparedRequest
//!     → adapter.rs (options, accept list, payload)
//!     → client.rs (token, message id, CON retransmission)
//!     → message.rs (wire encoding) → UDP
//!
//! UDP → message.rs (decode)
//!     → client.rs (match by token, ACK/RST handling, freshness)
//!     → adapter.rs (NativeResponse view, code.rs status map)
//!     → ResponseProcessor / ObservationSink
//! ```

pub mod adapter;
pub mod backend;
pub mod client;
pub mod code;
pub mod message;
pub mod option;
pub mod reliability;

pub use adapter::{CoapAdapter, CoapRequest};
pub use backend::CoapBackend;
pub use client::{CoapClient, NotificationCallback, ObservationEnd, ResponseCallback};
pub use code::{MessageCode, MessageType};
pub use message::{CodecError, CoapMessage, Token};
pub use option::CoapOption;
pub use reliability::TransmissionParameters;
