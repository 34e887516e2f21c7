//! Semantic cache subsystem.
//!
//! # Data Flow
//! ```text
//! ResourceOutcome::Success / origin update
//!     → expiry.rs (CacheUpdater: write through, schedule eviction)
//!     → SemanticCache::put_named_graph (delete old graph, insert new one)
//!
//! GraphReader / SPARQL endpoint
//!     → SemanticCache::get_named_graph / process_query
//! ```
//!
//! # Design Decisions
//! - Named graphs are replaced wholesale, never patched
//! - Every cache call is treated as blocking and runs on the worker pool
//! - Engines are swappable behind the `SemanticCache` trait

pub mod dummy;
pub mod expiry;
pub mod store;

use oxigraph::model::{Graph, NamedNode};
use std::time::SystemTime;
use thiserror::Error;

pub use dummy::DummyCache;
pub use expiry::CacheUpdater;
pub use store::OxigraphCache;

/// A named graph held in the cache.
#[derive(Debug, Clone)]
pub struct CachedGraph {
    /// Graph name, the origin URI of the data.
    pub name: NamedNode,
    pub graph: Graph,
    pub expiry: SystemTime,
}

/// Result of a SPARQL query against the cache.
#[derive(Debug)]
pub enum ResultSet {
    /// SPARQL 1.1 JSON results document for SELECT queries.
    Solutions(serde_json::Value),
    /// ASK result.
    Boolean(bool),
    /// CONSTRUCT / DESCRIBE result.
    Graph(Graph),
}

/// Errors raised by cache engines.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("query evaluation failed: {0}")]
    Evaluation(String),

    #[error("{0} is not supported by this cache")]
    Unsupported(&'static str),
}

impl From<oxigraph::store::StorageError> for CacheError {
    fn from(err: oxigraph::store::StorageError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<oxigraph::sparql::QueryEvaluationError> for CacheError {
    fn from(err: oxigraph::sparql::QueryEvaluationError) -> Self {
        CacheError::Evaluation(err.to_string())
    }
}

/// Narrow interface to a triple store holding one named graph per origin.
///
/// Implementations synchronize internally. Calls may block.
pub trait SemanticCache: Send + Sync {
    fn contains_named_graph(&self, name: &NamedNode) -> Result<bool, CacheError>;

    fn get_named_graph(&self, name: &NamedNode) -> Result<Option<CachedGraph>, CacheError>;

    /// Replace the named graph: the old content is deleted before the new
    /// content is inserted, and readers never see a mix of both.
    fn put_named_graph(&self, entry: CachedGraph) -> Result<(), CacheError>;

    /// Returns whether a graph was removed.
    fn delete_named_graph(&self, name: &NamedNode) -> Result<bool, CacheError>;

    fn process_query(&self, query: &str) -> Result<ResultSet, CacheError>;

    fn named_graph_count(&self) -> usize;
}
