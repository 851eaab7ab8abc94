//! Access to GPU telemetry
//!
//! This module provides:
//! - The [`TelemetryBackend`] trait the collector queries through
//! - Label selector construction for exporter metrics
//! - A best-effort parser for text telemetry records
//! - A Prometheus HTTP API backend

mod parser;
mod prometheus_api;

pub use parser::{
    fields, render_record, MetricKind, ParsedRecord, TelemetryParser, METRIC_KIND_COUNT,
};
pub use prometheus_api::PrometheusBackend;

use crate::error::TelemetryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trait for telemetry storage backends
#[async_trait]
pub trait TelemetryBackend: Send + Sync {
    /// Distinct values of `label` seen within the last `window`, restricted to
    /// series matching `selector`
    async fn label_values(
        &self,
        label: &str,
        selector: &str,
        window: Duration,
    ) -> TelemetryResult<Vec<String>>;

    /// Instant query returning one text record per line
    async fn query(&self, selector: &str) -> TelemetryResult<String>;
}

/// How exporter metrics are named and labelled, and how long backend calls may take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,
    #[serde(default = "default_node_label")]
    pub node_label: String,
    #[serde(default = "default_device_label")]
    pub device_label: String,
    /// Look-back window for label discovery
    #[serde(default = "default_label_window", with = "duration_secs")]
    pub label_window: Duration,
    /// Upper bound on every backend call
    #[serde(default = "default_query_timeout", with = "duration_secs")]
    pub query_timeout: Duration,
}

fn default_metric_prefix() -> String {
    "observerward_".to_string()
}

fn default_node_label() -> String {
    "kubernetes_node".to_string()
}

fn default_device_label() -> String {
    "id".to_string()
}

fn default_label_window() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metric_prefix: default_metric_prefix(),
            node_label: default_node_label(),
            device_label: default_device_label(),
            label_window: default_label_window(),
            query_timeout: default_query_timeout(),
        }
    }
}

impl TelemetryConfig {
    pub fn parser(&self) -> TelemetryParser {
        TelemetryParser::new(&self.metric_prefix, &self.node_label, &self.device_label)
    }

    /// Selector over every exporter metric
    pub fn selector(&self) -> Selector {
        Selector::new(&self.metric_prefix)
    }
}

/// Series selector: exporter metric names conjoined with exact label matches
///
/// Renders as `{__name__=~"observerward_.*", kubernetes_node="n1", id="0"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    metric_prefix: String,
    matchers: Vec<(String, String)>,
}

impl Selector {
    pub fn new(metric_prefix: impl Into<String>) -> Self {
        Self {
            metric_prefix: metric_prefix.into(),
            matchers: Vec::new(),
        }
    }

    /// Add an exact-match label constraint
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.matchers.push((name.into(), value.into()));
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!(r#"{{__name__=~"{}.*""#, self.metric_prefix);
        for (name, value) in &self.matchers {
            out.push_str(&format!(r#", {}="{}""#, name, escape_label_value(value)));
        }
        out.push('}');
        out
    }
}

/// Quote-safe form of a label value, as in the exposition format
pub(crate) fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('\n', r"\n")
}

/// Serde helper storing durations as whole seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
