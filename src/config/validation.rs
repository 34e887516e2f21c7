//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Keep the request timeout above the CoAP exchange budget
//! - Check origin URIs, graph names and file languages
//! - Check virtual sensor definitions (names, URIs, queries)
//!
//! Returns all validation errors, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::backend::virtual_sensor::is_valid_sensor_name;
use crate::coap::reliability::TransmissionParameters;
use crate::config::schema::ProxyConfig;
use crate::rdf::Language;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a parsed configuration. Pure: no I/O.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.addressing.dns_name.trim().is_empty() {
        errors.push(ValidationError::new("addressing.dns_name", "must not be empty"));
    }
    if config.addressing.port == 0 {
        errors.push(ValidationError::new("addressing.port", "must not be 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }
    if config.observability.metrics_enabled {
        check_socket_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let coap = &config.coap;
    if coap.enabled {
        check_socket_address(&mut errors, "coap.bind_address", &coap.bind_address);
        if coap.ack_timeout_ms == 0 {
            errors.push(ValidationError::new("coap.ack_timeout_ms", "must be greater than 0"));
        }
        if coap.ack_random_factor < 1.0 || !coap.ack_random_factor.is_finite() {
            errors.push(ValidationError::new("coap.ack_random_factor", "must be at least 1.0"));
        }
        if coap.response_timeout_secs == 0 {
            errors.push(ValidationError::new("coap.response_timeout_secs", "must be greater than 0"));
        }
        check_path(&mut errors, "coap.generic_path", &coap.generic_path);

        // The HTTP timeout must not preempt the transport's own 504.
        if coap.ack_random_factor.is_finite() && config.timeouts.request_secs > 0 {
            let budget = TransmissionParameters::from_config(coap).exchange_budget();
            if Duration::from_secs(config.timeouts.request_secs) <= budget {
                errors.push(ValidationError::new(
                    "timeouts.request_secs",
                    format!(
                        "must be longer than the CoAP exchange budget of {:.1}s (max transmit wait plus response timeout)",
                        budget.as_secs_f64()
                    ),
                ));
            }
        }

        let mut seen = HashSet::new();
        for (index, origin) in coap.origins.iter().enumerate() {
            let field = format!("coap.origins[{index}].uri");
            match Url::parse(&origin.uri) {
                Ok(uri) if uri.scheme() == "coap" && uri.host().is_some() => {
                    if !seen.insert(uri) {
                        errors.push(ValidationError::new(field, format!("duplicate origin {}", origin.uri)));
                    }
                }
                Ok(_) => errors.push(ValidationError::new(field, "must be a coap:// URI with a host")),
                Err(e) => errors.push(ValidationError::new(field, format!("invalid URI: {e}"))),
            }
        }
    } else if !coap.origins.is_empty() {
        errors.push(ValidationError::new("coap.origins", "configured while coap is disabled"));
    }

    if config.sparql.enabled {
        check_path(&mut errors, "sparql.path", &config.sparql.path);
    }

    let virtual_sensors = &config.virtual_sensors;
    if virtual_sensors.enabled {
        if virtual_sensors.period_secs == 0 {
            errors.push(ValidationError::new("virtual_sensors.period_secs", "must be greater than 0"));
        }
        check_path(&mut errors, "virtual_sensors.creation_path", &virtual_sensors.creation_path);

        let mut names = HashSet::new();
        for (index, sensor) in virtual_sensors.sensors.iter().enumerate() {
            let field = |name: &str| format!("virtual_sensors.sensors[{index}].{name}");
            if !is_valid_sensor_name(&sensor.name) {
                errors.push(ValidationError::new(field("name"), format!("invalid sensor name {:?}", sensor.name)));
            } else if !names.insert(sensor.name.as_str()) {
                errors.push(ValidationError::new(field("name"), format!("duplicate sensor {}", sensor.name)));
            }
            for (name, value) in [
                ("sensor_type", &sensor.sensor_type),
                ("feature_of_interest", &sensor.feature_of_interest),
                ("observed_property", &sensor.observed_property),
            ] {
                if Url::parse(value).is_err() {
                    errors.push(ValidationError::new(field(name), "must be an absolute URI"));
                }
            }
            if sensor.query.trim().is_empty() {
                errors.push(ValidationError::new(field("query"), "must not be empty"));
            }
        }
    } else if !virtual_sensors.sensors.is_empty() {
        errors.push(ValidationError::new(
            "virtual_sensors.sensors",
            "configured while virtual sensors are disabled",
        ));
    }

    for (index, file) in config.files.iter().enumerate() {
        let has_language = Path::new(&file.path)
            .extension()
            .and_then(|extension| extension.to_str())
            .and_then(Language::from_extension)
            .is_some();
        if !has_language {
            errors.push(ValidationError::new(
                format!("files[{index}].path"),
                "unknown RDF file extension (expected .rdf, .xml, .n3 or .ttl)",
            ));
        }
        if Url::parse(&file.graph).is_err() {
            errors.push(ValidationError::new(
                format!("files[{index}].graph"),
                "must be an absolute URI",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address {value:?}")));
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::new(field, "must be an absolute path"));
    }
}
