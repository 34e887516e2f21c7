//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! buffered HTTP request
//!     → addressing.rs (normalize to proxy URI; 400 if impossible)
//!     → registry.rs (lookup; 404 if nothing registered)
//!     → dispatcher.rs (spawn processor on the worker pool)
//!         → processor.rs: Page | Semantic | Graph
//!     → http::response (render outcome or error)
//! ```
//!
//! # Design Decisions
//! - The IO task only awaits the worker task's join handle
//! - A panicking processor becomes a 500, never a dropped connection
//! - Registry keys are normalized exactly like request targets

pub mod addressing;
pub mod dispatcher;
pub mod error;
pub mod processor;
pub mod registry;
pub mod request;

pub use addressing::{AddressingError, ProxyAddressing};
pub use dispatcher::RequestDispatcher;
pub use error::DispatchError;
pub use processor::{GraphReader, PageResponse, Processor, ProcessorOutput, SemanticProcessor, WebPage};
pub use registry::{RegistryError, ServiceDirectory, ServiceRegistry};
pub use request::ProxyRequest;
