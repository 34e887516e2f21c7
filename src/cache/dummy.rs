//! Cache engine that stores nothing.
//!
//! Every read misses, so every GraphReader request falls back to the origin.

use oxigraph::model::NamedNode;

use super::{CacheError, CachedGraph, ResultSet, SemanticCache};

#[derive(Debug, Default)]
pub struct DummyCache;

impl SemanticCache for DummyCache {
    fn contains_named_graph(&self, _name: &NamedNode) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn get_named_graph(&self, _name: &NamedNode) -> Result<Option<CachedGraph>, CacheError> {
        Ok(None)
    }

    fn put_named_graph(&self, entry: CachedGraph) -> Result<(), CacheError> {
        tracing::trace!(graph = %entry.name, "Dummy cache discarded graph");
        Ok(())
    }

    fn delete_named_graph(&self, _name: &NamedNode) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn process_query(&self, _query: &str) -> Result<ResultSet, CacheError> {
        Err(CacheError::Unsupported("SPARQL"))
    }

    fn named_graph_count(&self) -> usize {
        0
    }
}
