//! Form for defining virtual sensors.
//!
//! GET serves an HTML form. POST takes the form-encoded fields
//! `sensorName`, `sensorType`, `foi`, `property`, `query` and `button`.
//! `button=btnPreview` runs the query once and answers with the sensor
//! graph in Turtle; anything else creates the sensor.

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{VirtualSensor, VirtualSensorError, VirtualSensors};
use crate::dispatch::{PageResponse, ProxyRequest, WebPage};
use crate::rdf::{serialize_graph, Language};

const JSON: &str = "application/json";
const PREVIEW: &str = "btnPreview";

pub struct VirtualSensorCreator {
    sensors: Arc<VirtualSensors>,
}

impl VirtualSensorCreator {
    pub fn new(sensors: Arc<VirtualSensors>) -> Self {
        Self { sensors }
    }

    fn definition(&self, form: &HashMap<String, String>) -> Result<VirtualSensor, VirtualSensorError> {
        let field = |name: &'static str| {
            form.get(name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .ok_or(VirtualSensorError::MissingField(name))
        };
        VirtualSensor::new(
            self.sensors.sensor_uri(field("sensorName")?)?,
            field("sensorType")?,
            field("foi")?,
            field("property")?,
            field("query")?,
        )
    }

    async fn preview(&self, sensor: &VirtualSensor) -> Result<PageResponse, VirtualSensorError> {
        let (value, duration) = self.sensors.observe(sensor).await?;
        let turtle = match serialize_graph(&sensor.graph(&value), Language::Turtle) {
            Ok(body) => String::from_utf8_lossy(&body).into_owned(),
            Err(e) => return Ok(PageResponse::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        };
        Ok(json_page(&json!({
            "sensorStatus": turtle,
            "duration": duration.as_millis() as u64,
        })))
    }
}

#[async_trait]
impl WebPage for VirtualSensorCreator {
    async fn respond(&self, request: &ProxyRequest) -> PageResponse {
        if request.method() == Method::GET {
            return PageResponse::ok("text/html; charset=utf-8", FORM_HTML);
        }
        if request.method() != Method::POST {
            return PageResponse::text(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Method {} is not allowed.", request.method()),
            );
        }

        let form: HashMap<String, String> = request
            .body()
            .map(|body| url::form_urlencoded::parse(body).into_owned().collect())
            .unwrap_or_default();
        let sensor = match self.definition(&form) {
            Ok(sensor) => sensor,
            Err(e) => return error_page(&e),
        };

        let result = if form.get("button").map(String::as_str) == Some(PREVIEW) {
            self.preview(&sensor).await
        } else {
            self.sensors.create(sensor.clone()).await.map(|proxy_uri| {
                json_page(&json!({
                    "graphName": sensor.identifier().as_str(),
                    "proxyUri": proxy_uri.as_str(),
                    "regResult": "OK",
                }))
            })
        };
        result.unwrap_or_else(|e| error_page(&e))
    }
}

fn json_page(value: &serde_json::Value) -> PageResponse {
    match serde_json::to_vec(value) {
        Ok(body) => PageResponse::ok(JSON, body),
        Err(e) => PageResponse::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn error_page(error: &VirtualSensorError) -> PageResponse {
    let status = if error.is_invalid_definition() {
        StatusCode::BAD_REQUEST
    } else if error.is_duplicate() {
        StatusCode::CONFLICT
    } else {
        tracing::warn!(error = %error, "Virtual sensor creation failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    PageResponse::text(status, error.to_string())
}

const FORM_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Virtual sensor creation</title></head>
<body>
<h1>Create a virtual sensor</h1>
<form method="post">
<p><label>Name <input name="sensorName"></label></p>
<p><label>Sensor type <input name="sensorType" size="60"></label></p>
<p><label>Feature of interest <input name="foi" size="60"></label></p>
<p><label>Observed property <input name="property" size="60"></label></p>
<p><label>Query (binds ?val)<br><textarea name="query" rows="10" cols="80"></textarea></label></p>
<p>
<button name="button" value="btnPreview">Preview</button>
<button name="button" value="btnCreate">Create</button>
</p>
</form>
</body>
</html>
"#;
