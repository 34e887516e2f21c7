//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from the TOML file.
//! Every section has defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration of the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    pub listener: ListenerConfig,

    /// Authority used to build proxy URIs.
    pub addressing: AddressingConfig,

    pub timeouts: TimeoutConfig,

    pub workers: WorkerConfig,

    pub coap: CoapConfig,

    pub cache: CacheConfig,

    pub sparql: SparqlConfig,

    pub virtual_sensors: VirtualSensorsConfig,

    /// Static RDF files registered at startup.
    pub files: Vec<FileConfig>,

    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AddressingConfig {
    /// Host name in published proxy URIs.
    pub dns_name: String,

    pub port: u16,

    /// Postfixes under which `<ipv6 with '-' for ':'>.<postfix>` names the
    /// literal IPv6 address.
    pub wildcard_dns_postfixes: Vec<String>,
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            dns_name: "localhost".to_string(),
            port: 8080,
            wildcard_dns_postfixes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    /// Must exceed the CoAP exchange budget, so that unreachable origins
    /// are reported by the transport.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 180 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WorkerConfig {
    /// Threads of the internal worker pool. 0 means one per CPU.
    pub internal_threads: usize,
}

/// CoAP back-end configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoapConfig {
    pub enabled: bool,

    /// Local UDP endpoint.
    pub bind_address: String,

    /// Send requests as confirmable messages.
    pub confirmable: bool,

    pub ack_timeout_ms: u64,

    pub ack_random_factor: f64,

    pub max_retransmit: u32,

    /// Wait for a separate or non-confirmable response, in seconds.
    pub response_timeout_secs: u64,

    /// Proxy path of the generic gateway (`<path>?uri=<coap uri>`).
    pub generic_path: String,

    pub origins: Vec<CoapOriginConfig>,
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "[::]:0".to_string(),
            confirmable: true,
            ack_timeout_ms: 2000,
            ack_random_factor: 1.5,
            max_retransmit: 4,
            response_timeout_secs: 60,
            generic_path: "/coap".to_string(),
            origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoapOriginConfig {
    pub uri: String,

    #[serde(default)]
    pub observe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-memory triple store.
    #[default]
    Memory,
    /// Stores nothing.
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Delay between a graph's expiry and its deletion, in seconds.
    pub expiry_grace_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            expiry_grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SparqlConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for SparqlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/sparql".to_string(),
        }
    }
}

/// Sensors derived from SPARQL queries over the cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VirtualSensorsConfig {
    pub enabled: bool,

    /// Seconds between two observations of a sensor.
    pub period_secs: u64,

    /// Path of the creation form.
    pub creation_path: String,

    pub sensors: Vec<VirtualSensorConfig>,
}

impl Default for VirtualSensorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: 60,
            creation_path: "/services/virtual-sensor-creation".to_string(),
            sensors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirtualSensorConfig {
    /// Short name, becomes the fragment of `http://<authority>/vs#<name>`.
    pub name: String,
    pub sensor_type: String,
    pub feature_of_interest: String,
    pub observed_property: String,

    /// SELECT query binding `?val`.
    pub query: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileConfig {
    pub path: String,

    /// Graph name (an absolute URI).
    pub graph: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
