//! Prometheus HTTP API backend
//!
//! Label discovery goes through `/api/v1/label/<name>/values` and device
//! records through instant queries on `/api/v1/query`. Instant vectors are
//! rendered back into text records, one sample per line.

use super::parser::render_record;
use super::TelemetryBackend;
use crate::error::{TelemetryError, TelemetryResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Response envelope shared by every Prometheus API endpoint
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType", default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Telemetry backend talking to a Prometheus server
pub struct PrometheusBackend {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl PrometheusBackend {
    /// Create a backend for the server at `address`, e.g. `http://prometheus:9090`
    pub fn new(address: &str, timeout: Duration) -> TelemetryResult<Self> {
        let base_url = Url::parse(address)
            .map_err(|e| TelemetryError::InvalidEndpoint(format!("{}: {}", address, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TelemetryError::InvalidEndpoint(address.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn address(&self) -> &str {
        self.base_url.as_str()
    }

    fn endpoint(&self, segments: &[&str]) -> TelemetryResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TelemetryError::InvalidEndpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `url`, decode the envelope and return its data
    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: Url,
        params: &[(&str, String)],
    ) -> TelemetryResult<T> {
        let request = async {
            let response = self.client.get(url).query(params).send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, TelemetryError>((status, body))
        };
        let (status, body) = with_timeout(operation, self.timeout, request).await?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TelemetryError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
            Err(e) => return Err(TelemetryError::Decode(e.to_string())),
        };

        for warning in &envelope.warnings {
            warn!(operation = operation, warning = %warning, "Prometheus returned a warning");
        }

        if envelope.status != "success" {
            return Err(TelemetryError::Backend {
                error_type: envelope.error_type.unwrap_or_else(|| "unknown".to_string()),
                message: envelope.error.unwrap_or_default(),
            });
        }

        envelope
            .data
            .ok_or_else(|| TelemetryError::Decode(format!("{} response carried no data", operation)))
    }
}

#[async_trait]
impl TelemetryBackend for PrometheusBackend {
    async fn label_values(
        &self,
        label: &str,
        selector: &str,
        window: Duration,
    ) -> TelemetryResult<Vec<String>> {
        let url = self.endpoint(&["api", "v1", "label", label, "values"])?;
        let end = unix_now();
        let start = end - window.as_secs_f64();
        let params = [
            ("match[]", selector.to_string()),
            ("start", format!("{:.3}", start)),
            ("end", format!("{:.3}", end)),
        ];

        debug!(label = %label, selector = %selector, "Querying label values");
        self.get("label values query", url, &params).await
    }

    async fn query(&self, selector: &str) -> TelemetryResult<String> {
        let url = self.endpoint(&["api", "v1", "query"])?;
        let params = [
            ("query", selector.to_string()),
            ("time", format!("{:.3}", unix_now())),
        ];

        debug!(selector = %selector, "Running instant query");
        let data: QueryData = self.get("instant query", url, &params).await?;
        render_vector(data)
    }
}

/// Render an instant vector as newline separated text records
fn render_vector(data: QueryData) -> TelemetryResult<String> {
    if data.result_type != "vector" {
        return Err(TelemetryError::Decode(format!(
            "expected an instant vector, got {}",
            data.result_type
        )));
    }

    let samples: Vec<VectorSample> =
        serde_json::from_value(data.result).map_err(|e| TelemetryError::Decode(e.to_string()))?;

    let records = samples
        .into_iter()
        .map(|mut sample| {
            let name = sample.metric.remove("__name__").unwrap_or_default();
            let (timestamp, value) = sample.value;
            render_record(&name, &sample.metric, &value, timestamp)
        })
        .collect::<Vec<_>>();

    Ok(records.join("\n"))
}

async fn with_timeout<T>(
    operation: &'static str,
    timeout: Duration,
    fut: impl Future<Output = TelemetryResult<T>>,
) -> TelemetryResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(TelemetryError::Timeout { operation, timeout }),
    }
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
