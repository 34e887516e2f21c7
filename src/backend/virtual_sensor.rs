//! Virtual sensors: SPARQL queries over the cache published as sensor
//! observations.
//!
//! A sensor runs its SELECT query periodically and takes the first binding
//! of `?val` as the observed value, or the plain literal `"null"` when the
//! query has no such binding. Each observation is written as an SSN graph
//! named after the sensor, which is registered as a static data origin.

use dashmap::DashMap;
use oxigraph::model::vocab::rdf;
use oxigraph::model::{BlankNode, Graph, Literal, NamedNode, Term, Triple};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use super::origin::{DataOrigin, DataOriginRegistrar, RegistrationError};
use crate::cache::{CacheError, ResultSet, SemanticCache};
use crate::config::schema::VirtualSensorConfig;
use crate::dispatch::{AddressingError, ProxyAddressing, RegistryError};
use crate::rdf::far_future_expiry;

const SSN: &str = "http://purl.oclc.org/NET/ssnx/ssn#";
const VALUE_VARIABLE: &str = "val";

#[derive(Debug, Error)]
pub enum VirtualSensorError {
    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("invalid sensor name {0:?}")]
    InvalidName(String),

    #[error("{field} is not an absolute URI: {value}")]
    InvalidUri { field: &'static str, value: String },

    #[error("the query of a virtual sensor must be a SELECT query")]
    NotSelect,

    #[error(transparent)]
    Query(#[from] CacheError),

    #[error(transparent)]
    Addressing(#[from] AddressingError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("observation was interrupted: {0}")]
    Interrupted(String),
}

impl VirtualSensorError {
    /// Whether the definition itself is at fault rather than the proxy.
    pub fn is_invalid_definition(&self) -> bool {
        matches!(
            self,
            VirtualSensorError::MissingField(_)
                | VirtualSensorError::InvalidName(_)
                | VirtualSensorError::InvalidUri { .. }
                | VirtualSensorError::NotSelect
                | VirtualSensorError::Query(CacheError::InvalidQuery(_) | CacheError::Unsupported(_))
        )
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            VirtualSensorError::Registration(RegistrationError::Registry(RegistryError::AlreadyRegistered(_)))
        )
    }
}

/// Letters, digits, `-`, `_` and `.`.
pub fn is_valid_sensor_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Definition of one virtual sensor. The sensor IRI doubles as the name of
/// its graph.
#[derive(Debug, Clone)]
pub struct VirtualSensor {
    identifier: Url,
    name: NamedNode,
    sensor_type: NamedNode,
    feature_of_interest: NamedNode,
    observed_property: NamedNode,
    query: String,
}

impl VirtualSensor {
    pub fn new(
        identifier: Url,
        sensor_type: &str,
        feature_of_interest: &str,
        observed_property: &str,
        query: impl Into<String>,
    ) -> Result<Self, VirtualSensorError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(VirtualSensorError::MissingField("query"));
        }
        let name = NamedNode::new(identifier.as_str())
            .map_err(|_| VirtualSensorError::InvalidName(identifier.to_string()))?;
        Ok(Self {
            identifier,
            name,
            sensor_type: absolute("sensor type", sensor_type)?,
            feature_of_interest: absolute("feature of interest", feature_of_interest)?,
            observed_property: absolute("observed property", observed_property)?,
            query,
        })
    }

    pub fn identifier(&self) -> &Url {
        &self.identifier
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Run the query once. Blocking.
    pub fn observe(&self, cache: &dyn SemanticCache) -> Result<Term, VirtualSensorError> {
        match cache.process_query(&self.query)? {
            ResultSet::Solutions(results) => {
                Ok(first_value(&results).unwrap_or_else(|| Literal::new_simple_literal("null").into()))
            }
            ResultSet::Boolean(_) | ResultSet::Graph(_) => Err(VirtualSensorError::NotSelect),
        }
    }

    /// SSN description of the sensor carrying one observation.
    pub fn graph(&self, value: &Term) -> Graph {
        let ssn = |local: &str| NamedNode::new_unchecked(format!("{SSN}{local}"));
        let sensor = &self.name;
        let observation = BlankNode::default();
        let output = BlankNode::default();

        let triples = [
            Triple::new(sensor.clone(), rdf::TYPE, self.sensor_type.clone()),
            Triple::new(sensor.clone(), ssn("observes"), self.observed_property.clone()),
            Triple::new(sensor.clone(), ssn("madeObservation"), observation.clone()),
            Triple::new(observation.clone(), rdf::TYPE, ssn("Observation")),
            Triple::new(observation.clone(), ssn("featureOfInterest"), self.feature_of_interest.clone()),
            Triple::new(observation.clone(), ssn("observedProperty"), self.observed_property.clone()),
            Triple::new(observation, ssn("observationResult"), output.clone()),
            Triple::new(output.clone(), rdf::TYPE, ssn("SensorOutput")),
            Triple::new(output.clone(), ssn("isProducedBy"), sensor.clone()),
            Triple::new(output, ssn("hasValue"), value.clone()),
            Triple::new(self.feature_of_interest.clone(), self.observed_property.clone(), value.clone()),
        ];

        let mut graph = Graph::new();
        for triple in &triples {
            graph.insert(triple);
        }
        graph
    }
}

impl TryFrom<(Url, &VirtualSensorConfig)> for VirtualSensor {
    type Error = VirtualSensorError;

    fn try_from((identifier, config): (Url, &VirtualSensorConfig)) -> Result<Self, Self::Error> {
        VirtualSensor::new(
            identifier,
            &config.sensor_type,
            &config.feature_of_interest,
            &config.observed_property,
            config.query.clone(),
        )
    }
}

fn absolute(field: &'static str, value: &str) -> Result<NamedNode, VirtualSensorError> {
    let invalid = || VirtualSensorError::InvalidUri {
        field,
        value: value.to_string(),
    };
    let uri = Url::parse(value.trim()).map_err(|_| invalid())?;
    NamedNode::new(uri.as_str()).map_err(|_| invalid())
}

fn first_value(results: &Value) -> Option<Term> {
    let binding = results["results"]["bindings"].get(0)?.get(VALUE_VARIABLE)?;
    term_from_json(binding)
}

/// Term from a SPARQL JSON results binding.
fn term_from_json(binding: &Value) -> Option<Term> {
    let value = binding["value"].as_str()?;
    match binding["type"].as_str()? {
        "uri" => NamedNode::new(value).ok().map(Term::from),
        "bnode" => BlankNode::new(value).ok().map(Term::from),
        "literal" | "typed-literal" => {
            if let Some(language) = binding["xml:lang"].as_str() {
                Literal::new_language_tagged_literal(value, language)
                    .ok()
                    .map(Term::from)
            } else if let Some(datatype) = binding["datatype"].as_str() {
                let datatype = NamedNode::new(datatype).ok()?;
                Some(Literal::new_typed_literal(value, datatype).into())
            } else {
                Some(Literal::new_simple_literal(value).into())
            }
        }
        _ => None,
    }
}

/// Virtual sensors registered with the proxy, each refreshed by its own
/// task.
pub struct VirtualSensors {
    registrar: DataOriginRegistrar,
    addressing: ProxyAddressing,
    period: Duration,
    running: DashMap<Url, AbortHandle>,
}

impl VirtualSensors {
    pub fn new(registrar: DataOriginRegistrar, addressing: ProxyAddressing, period: Duration) -> Arc<Self> {
        Arc::new(Self {
            registrar,
            addressing,
            period,
            running: DashMap::new(),
        })
    }

    /// Sensor IRI for a short name: `http://<authority>/vs#<name>`.
    pub fn sensor_uri(&self, name: &str) -> Result<Url, VirtualSensorError> {
        if !is_valid_sensor_name(name) {
            return Err(VirtualSensorError::InvalidName(name.to_string()));
        }
        let mut uri = self.addressing.proxy_uri("/vs")?;
        uri.set_fragment(Some(name));
        Ok(uri)
    }

    /// Identifiers of the running sensors.
    pub fn sensors(&self) -> Vec<Url> {
        let mut sensors: Vec<Url> = self.running.iter().map(|entry| entry.key().clone()).collect();
        sensors.sort();
        sensors
    }

    /// Observe once on the worker pool. Returns the value and how long the
    /// query took.
    pub async fn observe(&self, sensor: &VirtualSensor) -> Result<(Term, Duration), VirtualSensorError> {
        let cache = Arc::clone(self.registrar.updater().cache());
        let sensor = sensor.clone();
        self.registrar
            .updater()
            .workers()
            .spawn(async move {
                let started = Instant::now();
                sensor
                    .observe(cache.as_ref())
                    .map(|value| (value, started.elapsed()))
            })
            .await
            .map_err(|e| VirtualSensorError::Interrupted(e.to_string()))?
    }

    /// Observe once, register the sensor graph and start periodic
    /// observations. Returns the proxy URI of the graph.
    pub async fn create(self: &Arc<Self>, sensor: VirtualSensor) -> Result<Url, VirtualSensorError> {
        let (value, _) = self.observe(&sensor).await?;
        let identifier = sensor.identifier().clone();
        let proxy_uri = self
            .registrar
            .register_data_origin(DataOrigin::Static {
                identifier: identifier.clone(),
                graph: sensor.graph(&value),
            })
            .await?;

        let task = self
            .registrar
            .updater()
            .workers()
            .spawn(run(Arc::downgrade(self), sensor, self.period));
        if let Some(previous) = self.running.insert(identifier.clone(), task.abort_handle()) {
            previous.abort();
        }

        tracing::info!(sensor = %identifier, proxy_uri = %proxy_uri, "Virtual sensor created");
        Ok(proxy_uri)
    }

    /// Create every configured sensor. A failing sensor is logged and
    /// skipped.
    pub async fn create_configured(self: &Arc<Self>, sensors: &[VirtualSensorConfig]) -> Vec<Url> {
        let mut created = Vec::with_capacity(sensors.len());
        for config in sensors {
            let sensor = self
                .sensor_uri(&config.name)
                .and_then(|identifier| VirtualSensor::try_from((identifier, config)));
            let result = match sensor {
                Ok(sensor) => self.create(sensor).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(uri) => created.push(uri),
                Err(e) => tracing::error!(sensor = %config.name, error = %e, "Skipping virtual sensor"),
            }
        }
        created
    }

    /// Stop a sensor and unregister its graph.
    pub async fn remove(&self, identifier: &Url) -> bool {
        let Some((_, task)) = self.running.remove(identifier) else {
            return false;
        };
        task.abort();
        self.registrar.unregister_data_origin(identifier).await
    }

    /// Stop every sensor. Their graphs go with the registrar.
    pub fn shutdown(&self) {
        self.running.retain(|_, task| {
            task.abort();
            false
        });
    }
}

async fn run(sensors: Weak<VirtualSensors>, sensor: VirtualSensor, period: Duration) {
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let Some(sensors) = sensors.upgrade() else {
            return;
        };
        let cache = Arc::clone(sensors.registrar.updater().cache());

        let started = Instant::now();
        let value = match sensor.observe(cache.as_ref()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(sensor = %sensor.identifier(), error = %e, "Virtual sensor query failed");
                continue;
            }
        };
        let refreshed = sensors
            .registrar
            .refresh_origin(sensor.identifier(), sensor.graph(&value), far_future_expiry())
            .await;
        match refreshed {
            Ok(true) => tracing::debug!(
                sensor = %sensor.identifier(),
                value = %value,
                duration_ms = started.elapsed().as_millis() as u64,
                "Virtual sensor observed"
            ),
            Ok(false) => {
                tracing::debug!(sensor = %sensor.identifier(), "Virtual sensor unregistered, stopping");
                sensors.running.remove(sensor.identifier());
                return;
            }
            Err(e) => tracing::warn!(sensor = %sensor.identifier(), error = %e, "Virtual sensor update failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheUpdater, OxigraphCache};
    use crate::dispatch::ServiceRegistry;
    use crate::lifecycle::WorkerPool;
    use crate::rdf::{parse_graph, Language};
    use oxigraph::model::vocab::xsd;

    const AVERAGE: &str = "SELECT (AVG(?t) AS ?val) WHERE { GRAPH ?g { ?room <http://example.org/temperature> ?t } }";

    fn rooms(first: u32, second: u32) -> Graph {
        let turtle = format!(
            "<http://example.org/room1> <http://example.org/temperature> {first} .\n\
             <http://example.org/room2> <http://example.org/temperature> {second} ."
        );
        parse_graph(turtle.as_bytes(), Language::Turtle, None).unwrap()
    }

    fn sensor(identifier: &str, query: &str) -> VirtualSensor {
        VirtualSensor::new(
            Url::parse(identifier).unwrap(),
            "http://example.org/AverageTemperatureSensor",
            "http://example.org/building",
            "http://example.org/averageTemperature",
            query,
        )
        .unwrap()
    }

    fn setup(period: Duration) -> (Arc<dyn SemanticCache>, DataOriginRegistrar, Arc<VirtualSensors>) {
        let cache: Arc<dyn SemanticCache> = Arc::new(OxigraphCache::new().unwrap());
        let updater = CacheUpdater::new(Arc::clone(&cache), WorkerPool::current(), Duration::ZERO);
        let addressing = ProxyAddressing::new("localhost", 8080);
        let registrar = DataOriginRegistrar::new(Arc::new(ServiceRegistry::new()), addressing.clone(), updater);
        let sensors = VirtualSensors::new(registrar.clone(), addressing, period);
        (cache, registrar, sensors)
    }

    fn observed_value(cache: &Arc<dyn SemanticCache>, identifier: &Url) -> Option<String> {
        let name = NamedNode::new(identifier.as_str()).unwrap();
        let has_value = NamedNode::new_unchecked(format!("{SSN}hasValue"));
        let cached = cache.get_named_graph(&name).unwrap()?;
        let value = cached
            .graph
            .triples_for_predicate(&has_value)
            .next()
            .map(|triple| triple.object.to_string());
        value
    }

    #[test]
    fn test_sensor_names() {
        assert!(is_valid_sensor_name("avg-temp_2.0"));
        assert!(!is_valid_sensor_name(""));
        assert!(!is_valid_sensor_name("two words"));
        assert!(!is_valid_sensor_name("a#b"));
    }

    #[test]
    fn test_rejects_relative_uris() {
        let result = VirtualSensor::new(
            Url::parse("http://localhost:8080/vs#avg").unwrap(),
            "AverageTemperatureSensor",
            "http://example.org/building",
            "http://example.org/averageTemperature",
            AVERAGE,
        );
        assert!(matches!(result, Err(VirtualSensorError::InvalidUri { field: "sensor type", .. })));
    }

    #[test]
    fn test_graph_describes_the_observation() {
        let sensor = sensor("http://localhost:8080/vs#avg", AVERAGE);
        let graph = sensor.graph(&Literal::new_simple_literal("21").into());

        assert_eq!(graph.len(), 11);
        let foi = NamedNode::new_unchecked("http://example.org/building");
        let property = NamedNode::new_unchecked("http://example.org/averageTemperature");
        let value = graph.object_for_subject_predicate(&foi, &property);
        assert_eq!(value.map(|term| term.to_string()), Some("\"21\"".to_string()));
        let observations = graph
            .subjects_for_predicate_object(rdf::TYPE, &NamedNode::new_unchecked(format!("{SSN}Observation")))
            .count();
        assert_eq!(observations, 1);
    }

    #[test]
    fn test_observe_takes_first_value_or_null() {
        let cache = OxigraphCache::new().unwrap();
        cache
            .put_named_graph(crate::cache::CachedGraph {
                name: NamedNode::new_unchecked("http://example.org/rooms"),
                graph: rooms(20, 22),
                expiry: far_future_expiry(),
            })
            .unwrap();

        let value = sensor("http://localhost:8080/vs#avg", AVERAGE).observe(&cache).unwrap();
        match value {
            Term::Literal(literal) => {
                assert_eq!(literal.value(), "21");
                assert_eq!(literal.datatype(), xsd::DECIMAL);
            }
            other => panic!("unexpected value {other}"),
        }

        let missing = "SELECT ?val WHERE { GRAPH ?g { ?s <http://example.org/humidity> ?val } }";
        let value = sensor("http://localhost:8080/vs#hum", missing).observe(&cache).unwrap();
        assert_eq!(value, Term::from(Literal::new_simple_literal("null")));

        let ask = sensor("http://localhost:8080/vs#ask", "ASK { ?s ?p ?o }").observe(&cache);
        assert!(matches!(ask, Err(VirtualSensorError::NotSelect)));
    }

    #[test]
    fn test_terms_from_json_bindings() {
        let term = |binding: Value| term_from_json(&binding).map(|term| term.to_string());
        assert_eq!(
            term(serde_json::json!({ "type": "uri", "value": "http://example.org/a" })).as_deref(),
            Some("<http://example.org/a>")
        );
        assert_eq!(
            term(serde_json::json!({ "type": "literal", "value": "warm", "xml:lang": "en" })).as_deref(),
            Some("\"warm\"@en")
        );
        assert_eq!(
            term(serde_json::json!({
                "type": "literal",
                "value": "3",
                "datatype": "http://www.w3.org/2001/XMLSchema#integer"
            }))
            .as_deref(),
            Some("\"3\"^^<http://www.w3.org/2001/XMLSchema#integer>")
        );
        assert_eq!(term(serde_json::json!({ "type": "triple", "value": "x" })), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sensor_follows_the_cache() {
        let (cache, registrar, sensors) = setup(Duration::from_millis(50));
        registrar
            .register_data_origin(DataOrigin::Static {
                identifier: Url::parse("http://example.org/rooms").unwrap(),
                graph: rooms(20, 22),
            })
            .await
            .unwrap();

        let identifier = sensors.sensor_uri("avg").unwrap();
        let proxy_uri = sensors.create(sensor(identifier.as_str(), AVERAGE)).await.unwrap();
        assert_eq!(registrar.proxy_uri(&identifier), Some(proxy_uri));
        assert_eq!(sensors.sensors(), vec![identifier.clone()]);
        assert!(observed_value(&cache, &identifier).unwrap().starts_with("\"21\""));

        registrar
            .update_cache(crate::backend::CacheUpdate::Graph {
                identifier: Url::parse("http://example.org/rooms").unwrap(),
                graph: rooms(24, 26),
                expiry: far_future_expiry(),
            })
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !observed_value(&cache, &identifier).is_some_and(|value| value.starts_with("\"25\""))
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(observed_value(&cache, &identifier).unwrap().starts_with("\"25\""));

        assert!(sensors.remove(&identifier).await);
        assert!(registrar.proxy_uri(&identifier).is_none());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(observed_value(&cache, &identifier), None);
        assert!(sensors.sensors().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_sensors() {
        let (_cache, _registrar, sensors) = setup(Duration::from_secs(60));
        let identifier = sensors.sensor_uri("avg").unwrap();
        sensors.create(sensor(identifier.as_str(), AVERAGE)).await.unwrap();

        let duplicate = sensors.create(sensor(identifier.as_str(), AVERAGE)).await.unwrap_err();
        assert!(duplicate.is_duplicate());

        let invalid = sensors
            .create(sensor("http://localhost:8080/vs#broken", "SELECT ?val WHERE {"))
            .await
            .unwrap_err();
        assert!(invalid.is_invalid_definition());
        assert!(matches!(sensors.sensor_uri("a b"), Err(VirtualSensorError::InvalidName(_))));

        sensors.shutdown();
        assert!(sensors.sensors().is_empty());
    }
}
