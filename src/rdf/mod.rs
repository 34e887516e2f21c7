//! RDF handling subsystem.
//!
//! # Data Flow
//! ```text
//! origin payload + content format
//!     → language.rs (content format / media type → Language)
//!     → graph.rs (parse into an oxigraph Graph)
//!
//! client Accept header
//!     → negotiation.rs (pick Language, default RDF/XML)
//!     → graph.rs (serialize Graph for the response body)
//! ```

pub mod graph;
pub mod language;
pub mod negotiation;

pub use graph::{far_future_expiry, is_far_future, parse_graph, serialize_graph, RdfError};
pub use language::Language;
pub use negotiation::negotiate;
