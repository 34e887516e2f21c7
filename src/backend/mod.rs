//! Back-end subsystem: everything between a dispatched request and an
//! origin that speaks another protocol.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → service.rs (pick the origin, fixed or from ?uri=)
//!     → gateway.rs (translate, attach a fresh ResponseProcessor, transmit)
//!     → adapter.rs (protocol-specific client, e.g. CoAP)
//!     → processor.rs (normalize exactly one outcome)
//!     → ResourceOutcome back to the dispatcher
//!
//! files / observations
//!     → origin.rs (DataOriginRegistrar)
//!     → cache updates on the worker pool
//!
//! virtual sensors
//!     → virtual_sensor.rs (periodic SPARQL query over the cache)
//!     → origin.rs (graph refreshed while the sensor is registered)
//! ```

pub mod adapter;
pub mod files;
pub mod gateway;
pub mod origin;
pub mod outcome;
pub mod processor;
pub mod service;
pub mod translator;
pub mod virtual_sensor;

pub use adapter::{
    ContentType, NativeRequest, NativeResponse, NativeStatus, ObservationHandle, ObservationSink,
    ProtocolAdapter, TranslationError, TransmitError,
};
pub use files::{register_files, FileError};
pub use gateway::{BackendGateway, GatewayError, OriginGateway, Subscription};
pub use origin::{CacheUpdate, DataOrigin, DataOriginRegistrar, RegistrationError};
pub use outcome::ResourceOutcome;
pub use processor::{normalize_response, ResponseProcessor};
pub use service::{GatewayService, TargetResolution};
pub use translator::{prepare, PreparedRequest, RequestMethod};
pub use virtual_sensor::{VirtualSensor, VirtualSensorError, VirtualSensors};
