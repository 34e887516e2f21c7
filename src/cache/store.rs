//! In-memory oxigraph store as the cache engine.

use dashmap::DashMap;
use oxigraph::model::vocab::xsd;
use oxigraph::model::{Graph, GraphNameRef, NamedNode, QuadRef, Term, Triple};
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use serde_json::{json, Value};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use super::{CacheError, CachedGraph, ResultSet, SemanticCache};

/// Cache backed by an in-memory oxigraph [`Store`].
///
/// Graph replacement is serialized by a writer lock so that readers see
/// either the old or the new graph, never an intermediate state.
pub struct OxigraphCache {
    store: Store,
    expiries: DashMap<NamedNode, SystemTime>,
    lock: RwLock<()>,
}

impl OxigraphCache {
    pub fn new() -> Result<Self, CacheError> {
        Ok(Self {
            store: Store::new()?,
            expiries: DashMap::new(),
            lock: RwLock::new(()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SemanticCache for OxigraphCache {
    fn contains_named_graph(&self, name: &NamedNode) -> Result<bool, CacheError> {
        Ok(self.expiries.contains_key(name))
    }

    fn get_named_graph(&self, name: &NamedNode) -> Result<Option<CachedGraph>, CacheError> {
        let _guard = self.read();
        let Some(expiry) = self.expiries.get(name).map(|entry| *entry.value()) else {
            return Ok(None);
        };

        let mut graph = Graph::new();
        for quad in self
            .store
            .quads_for_pattern(None, None, None, Some(GraphNameRef::NamedNode(name.as_ref())))
        {
            let quad = quad?;
            graph.insert(&Triple::new(quad.subject, quad.predicate, quad.object));
        }

        Ok(Some(CachedGraph {
            name: name.clone(),
            graph,
            expiry,
        }))
    }

    fn put_named_graph(&self, entry: CachedGraph) -> Result<(), CacheError> {
        let _guard = self.write();
        self.store.remove_named_graph(entry.name.as_ref())?;
        for triple in entry.graph.iter() {
            self.store.insert(QuadRef::new(
                triple.subject,
                triple.predicate,
                triple.object,
                entry.name.as_ref(),
            ))?;
        }
        tracing::debug!(graph = %entry.name, triples = entry.graph.len(), "Cached named graph");
        self.expiries.insert(entry.name, entry.expiry);
        Ok(())
    }

    fn delete_named_graph(&self, name: &NamedNode) -> Result<bool, CacheError> {
        let _guard = self.write();
        self.store.remove_named_graph(name.as_ref())?;
        Ok(self.expiries.remove(name).is_some())
    }

    fn process_query(&self, query: &str) -> Result<ResultSet, CacheError> {
        let _guard = self.read();
        let prepared = SparqlEvaluator::new()
            .parse_query(query)
            .map_err(|e| CacheError::InvalidQuery(e.to_string()))?;

        match prepared.on_store(&self.store).execute()? {
            QueryResults::Solutions(solutions) => {
                let vars: Vec<String> = solutions
                    .variables()
                    .iter()
                    .map(|variable| variable.as_str().to_string())
                    .collect();

                let mut bindings = Vec::new();
                for solution in solutions {
                    let solution = solution?;
                    let mut binding = serde_json::Map::new();
                    for (variable, term) in solution.iter() {
                        binding.insert(variable.as_str().to_string(), term_to_json(term));
                    }
                    bindings.push(Value::Object(binding));
                }

                Ok(ResultSet::Solutions(json!({
                    "head": { "vars": vars },
                    "results": { "bindings": bindings },
                })))
            }
            QueryResults::Boolean(answer) => Ok(ResultSet::Boolean(answer)),
            QueryResults::Graph(triples) => {
                let mut graph = Graph::new();
                for triple in triples {
                    graph.insert(&triple?);
                }
                Ok(ResultSet::Graph(graph))
            }
        }
    }

    fn named_graph_count(&self) -> usize {
        self.expiries.len()
    }
}

/// Render a term as a SPARQL 1.1 JSON results binding.
fn term_to_json(term: &Term) -> Value {
    match term {
        Term::NamedNode(node) => json!({ "type": "uri", "value": node.as_str() }),
        Term::BlankNode(node) => json!({ "type": "bnode", "value": node.as_str() }),
        Term::Literal(literal) => {
            let mut value = json!({ "type": "literal", "value": literal.value() });
            if let Some(language) = literal.language() {
                value["xml:lang"] = json!(language);
            } else if literal.datatype() != xsd::STRING {
                value["datatype"] = json!(literal.datatype().as_str());
            }
            value
        }
        #[allow(unreachable_patterns)]
        other => json!({ "type": "triple", "value": other.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{far_future_expiry, parse_graph, Language};

    fn graph(turtle: &str) -> Graph {
        parse_graph(turtle.as_bytes(), Language::Turtle, None).unwrap()
    }

    fn entry(name: &str, turtle: &str) -> CachedGraph {
        CachedGraph {
            name: NamedNode::new(name).unwrap(),
            graph: graph(turtle),
            expiry: far_future_expiry(),
        }
    }

    #[test]
    fn test_put_then_get() {
        let cache = OxigraphCache::new().unwrap();
        cache
            .put_named_graph(entry("coap://a/temp", "<http://x/s> <http://x/p> \"1\" ."))
            .unwrap();

        let name = NamedNode::new("coap://a/temp").unwrap();
        assert!(cache.contains_named_graph(&name).unwrap());
        let cached = cache.get_named_graph(&name).unwrap().unwrap();
        assert_eq!(cached.graph.len(), 1);
        assert_eq!(cached.expiry, far_future_expiry());
    }

    #[test]
    fn test_put_replaces_instead_of_merging() {
        let cache = OxigraphCache::new().unwrap();
        cache
            .put_named_graph(entry("coap://a/temp", "<http://x/s> <http://x/p> \"1\" . <http://x/s> <http://x/q> \"2\" ."))
            .unwrap();
        cache
            .put_named_graph(entry("coap://a/temp", "<http://x/s> <http://x/p> \"3\" ."))
            .unwrap();

        let name = NamedNode::new("coap://a/temp").unwrap();
        let cached = cache.get_named_graph(&name).unwrap().unwrap();
        assert_eq!(cached.graph.len(), 1);
        assert!(cached.graph.iter().any(|t| t.object.to_string() == "\"3\""));
    }

    #[test]
    fn test_delete_removes_graph() {
        let cache = OxigraphCache::new().unwrap();
        cache
            .put_named_graph(entry("coap://a/temp", "<http://x/s> <http://x/p> \"1\" ."))
            .unwrap();

        let name = NamedNode::new("coap://a/temp").unwrap();
        assert!(cache.delete_named_graph(&name).unwrap());
        assert!(!cache.delete_named_graph(&name).unwrap());
        assert!(cache.get_named_graph(&name).unwrap().is_none());
        assert_eq!(cache.named_graph_count(), 0);
    }

    #[test]
    fn test_select_query_returns_json_bindings() {
        let cache = OxigraphCache::new().unwrap();
        cache
            .put_named_graph(entry("coap://a/temp", "<http://x/s> <http://x/p> \"21\"@en ."))
            .unwrap();

        let result = cache
            .process_query("SELECT ?g ?o WHERE { GRAPH ?g { ?s <http://x/p> ?o } }")
            .unwrap();
        let ResultSet::Solutions(json) = result else {
            panic!("expected solutions");
        };
        assert_eq!(json["head"]["vars"], json!(["g", "o"]));
        let binding = &json["results"]["bindings"][0];
        assert_eq!(binding["g"]["value"], "coap://a/temp");
        assert_eq!(binding["o"]["xml:lang"], "en");
    }

    #[test]
    fn test_ask_and_construct() {
        let cache = OxigraphCache::new().unwrap();
        cache
            .put_named_graph(entry("coap://a/temp", "<http://x/s> <http://x/p> <http://x/o> ."))
            .unwrap();

        assert!(matches!(
            cache.process_query("ASK { GRAPH ?g { ?s ?p ?o } }").unwrap(),
            ResultSet::Boolean(true)
        ));
        let ResultSet::Graph(graph) = cache
            .process_query("CONSTRUCT { ?s ?p ?o } WHERE { GRAPH ?g { ?s ?p ?o } }")
            .unwrap()
        else {
            panic!("expected graph");
        };
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_invalid_query() {
        let cache = OxigraphCache::new().unwrap();
        assert!(matches!(
            cache.process_query("SELEKT nothing"),
            Err(CacheError::InvalidQuery(_))
        ));
    }
}
