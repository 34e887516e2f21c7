//! Smart Service Proxy library.
//!
//! Serves semantic (RDF) resources over HTTP. Requests are dispatched by
//! proxy URI to local pages, cache-backed graphs or back-end gateways that
//! bridge to CoAP, and every outcome is rendered in the client's preferred
//! RDF serialization.

pub mod backend;
pub mod cache;
pub mod coap;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rdf;
pub mod services;

pub use config::schema::ProxyConfig;
pub use dispatch::RequestDispatcher;
pub use http::HttpServer;
pub use lifecycle::{Proxy, Shutdown};
