//! Graph parsing and serialization on top of oxigraph's RDF I/O.

use oxigraph::io::{RdfParser, RdfSerializer};
use oxigraph::model::{Graph, Triple};
use std::time::{Duration, SystemTime};
use thiserror::Error;

use super::Language;

/// Seconds between the Unix epoch and 2100-01-01T00:00:00Z.
const FAR_FUTURE_SECS: u64 = 4_102_444_800;

/// Expiry used for graphs whose origin gave no freshness information.
pub fn far_future_expiry() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(FAR_FUTURE_SECS)
}

/// Whether an expiry is the far-future default (never scheduled for eviction).
pub fn is_far_future(expiry: SystemTime) -> bool {
    expiry >= far_future_expiry()
}

/// Errors raised while reading or writing RDF.
#[derive(Debug, Error)]
pub enum RdfError {
    #[error("invalid base IRI {iri}: {reason}")]
    InvalidBase { iri: String, reason: String },

    #[error("could not parse {language} payload: {reason}")]
    Parse { language: Language, reason: String },

    #[error("could not serialize graph as {language}: {reason}")]
    Serialize { language: Language, reason: String },
}

/// Parse a payload into a graph. Relative IRIs resolve against `base_iri`.
pub fn parse_graph(payload: &[u8], language: Language, base_iri: Option<&str>) -> Result<Graph, RdfError> {
    let mut parser = RdfParser::from_format(language.parser_format());
    if let Some(base) = base_iri {
        parser = parser.with_base_iri(base).map_err(|e| RdfError::InvalidBase {
            iri: base.to_string(),
            reason: e.to_string(),
        })?;
    }

    let mut graph = Graph::new();
    for quad in parser.for_slice(payload) {
        let quad = quad.map_err(|e| RdfError::Parse {
            language,
            reason: e.to_string(),
        })?;
        graph.insert(&Triple::new(quad.subject, quad.predicate, quad.object));
    }
    Ok(graph)
}

/// Serialize a graph into the given language.
pub fn serialize_graph(graph: &Graph, language: Language) -> Result<Vec<u8>, RdfError> {
    let serialize_error = |e: std::io::Error| RdfError::Serialize {
        language,
        reason: e.to_string(),
    };

    let mut serializer = RdfSerializer::from_format(language.serializer_format()).for_writer(Vec::new());
    for triple in graph.iter() {
        serializer.serialize_triple(triple).map_err(serialize_error)?;
    }
    serializer.finish().map_err(serialize_error)
}
