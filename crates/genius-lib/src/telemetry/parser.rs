//! Telemetry record parsing
//!
//! Turns one text record of the form
//!
//! ```text
//! observerward_dynamic_gpu_power_usage_W{id="0", kubernetes_node="n1", model="Tesla T4", uuid="GPU-1"} => 70 @[1621255638.419]
//! ```
//!
//! into a typed [`ParsedRecord`]. Parsing is best effort: a field that cannot be
//! extracted falls back to its zero value and the miss is logged and counted
//! under `genius_telemetry_parse_failures_total{field}`.

use super::escape_label_value;
use crate::error::ParseFailure;
use crate::observability::SchedulerMetrics;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// A double-quoted label value; `\"`, `\\` and `\n` escapes stay inside it
const QUOTED_VALUE: &str = r#""((?:[^"\\]|\\.)*)""#;
const QUOTED_NON_EMPTY: &str = r#""((?:[^"\\]|\\.)+)""#;

/// Number of metric kinds exported per device
pub const METRIC_KIND_COUNT: usize = 10;

/// Field names used when reporting parse failures
pub mod fields {
    pub const KIND: &str = "kind";
    pub const VALUE: &str = "value";
    pub const NODE_NAME: &str = "node_name";
    pub const UUID: &str = "uuid";
    pub const DEVICE_ID: &str = "device_id";
    pub const MODEL: &str = "model";
}

/// The ten per-device metrics exported by the GPU exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    DecoderUtilization,
    EncoderUtilization,
    MemoryUtilization,
    PowerUsage,
    UsedMemory,
    FreeMemory,
    MemorySize,
    MultiprocessorCount,
    SharedDecoderCount,
    SharedEncoderCount,
}

impl MetricKind {
    pub const ALL: [MetricKind; METRIC_KIND_COUNT] = [
        MetricKind::DecoderUtilization,
        MetricKind::EncoderUtilization,
        MetricKind::MemoryUtilization,
        MetricKind::PowerUsage,
        MetricKind::UsedMemory,
        MetricKind::FreeMemory,
        MetricKind::MemorySize,
        MetricKind::MultiprocessorCount,
        MetricKind::SharedDecoderCount,
        MetricKind::SharedEncoderCount,
    ];

    /// Metric name without the exporter prefix
    pub fn metric_name(self) -> &'static str {
        match self {
            MetricKind::DecoderUtilization => "dynamic_gpu_decoder_utilization",
            MetricKind::EncoderUtilization => "dynamic_gpu_encoder_utilization",
            MetricKind::MemoryUtilization => "dynamic_gpu_memory_utilization",
            MetricKind::PowerUsage => "dynamic_gpu_power_usage_W",
            MetricKind::UsedMemory => "dynamic_gpu_used_global_memory_MiB",
            MetricKind::FreeMemory => "dynamic_gpu_free_global_memory_MiB",
            MetricKind::MemorySize => "static_gpu_memory_size",
            MetricKind::MultiprocessorCount => "static_gpu_multiprocessor_count",
            MetricKind::SharedDecoderCount => "static_gpu_shared_decoder_count",
            MetricKind::SharedEncoderCount => "static_gpu_shared_encoder_count",
        }
    }

    pub fn from_metric_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.metric_name() == name)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric_name())
    }
}

/// Everything extracted from one telemetry record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecord {
    /// `None` when the metric name is missing or not one of the known kinds
    pub kind: Option<MetricKind>,
    pub value: u64,
    pub node_name: Option<String>,
    pub uuid: Option<String>,
    pub device_id: Option<u32>,
    pub model: Option<String>,
    /// Required fields (kind and value) that fell back to their zero value
    pub failures: Vec<ParseFailure>,
}

impl ParsedRecord {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Best-effort parser for exporter telemetry records
pub struct TelemetryParser {
    metric_prefix: String,
    kind_re: Regex,
    value_re: Regex,
    node_re: Regex,
    uuid_re: Regex,
    id_re: Regex,
    model_re: Regex,
    metrics: SchedulerMetrics,
}

impl TelemetryParser {
    /// Build a parser for metrics named `<metric_prefix><kind>` whose node and
    /// device identities are carried in `node_label` and `device_label`.
    pub fn new(metric_prefix: &str, node_label: &str, device_label: &str) -> Self {
        let kind_re = format!(r"{}(\w+)\{{", regex::escape(metric_prefix));
        let node_re = format!(r"\b{}={}", regex::escape(node_label), QUOTED_VALUE);
        let id_re = format!(r#"\b(?:{}|gpu)="(\d+)""#, regex::escape(device_label));

        Self {
            metric_prefix: metric_prefix.to_string(),
            kind_re: compile(&kind_re),
            value_re: compile(r"\}\s*=>\s*([0-9][0-9.eE+\-]*)\s*(?:@\[[^\]]*\])?\s*$"),
            node_re: compile(&node_re),
            uuid_re: compile(&format!(r"(?i)\buuid={}", QUOTED_NON_EMPTY)),
            id_re: compile(&id_re),
            model_re: compile(&format!(r"\bmodel={}", QUOTED_NON_EMPTY)),
            metrics: SchedulerMetrics::new(),
        }
    }

    pub fn metric_prefix(&self) -> &str {
        &self.metric_prefix
    }

    /// Parse every field of a record, substituting zero values for misses
    pub fn parse_record(&self, record: &str) -> ParsedRecord {
        let mut failures = Vec::new();

        let kind = match self.extract_kind(record) {
            Ok(kind) => Some(kind),
            Err(failure) => {
                self.report(&failure);
                failures.push(failure);
                None
            }
        };
        let value = match self.extract_value(record) {
            Ok(value) => value,
            Err(failure) => {
                self.report(&failure);
                failures.push(failure);
                0
            }
        };

        ParsedRecord {
            kind,
            value,
            node_name: self.extract_node_name(record).ok(),
            uuid: self.extract_uuid(record).ok(),
            device_id: self.extract_device_id(record).ok(),
            model: self.extract_model(record).ok(),
            failures,
        }
    }

    pub fn extract_kind(&self, record: &str) -> Result<MetricKind, ParseFailure> {
        self.capture(&self.kind_re, record)
            .and_then(MetricKind::from_metric_name)
            .ok_or_else(|| failure(fields::KIND, record))
    }

    /// Numeric token after the closing `}` and `=>`; fractional values are truncated
    pub fn extract_value(&self, record: &str) -> Result<u64, ParseFailure> {
        let token = self
            .capture(&self.value_re, record)
            .ok_or_else(|| failure(fields::VALUE, record))?;

        if let Ok(value) = token.parse::<u64>() {
            return Ok(value);
        }
        match token.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => Ok(value.trunc() as u64),
            _ => Err(failure(fields::VALUE, record)),
        }
    }

    pub fn extract_node_name(&self, record: &str) -> Result<String, ParseFailure> {
        self.capture_owned(&self.node_re, record, fields::NODE_NAME)
    }

    pub fn extract_uuid(&self, record: &str) -> Result<String, ParseFailure> {
        self.capture_owned(&self.uuid_re, record, fields::UUID)
    }

    pub fn extract_device_id(&self, record: &str) -> Result<u32, ParseFailure> {
        self.capture(&self.id_re, record)
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| failure(fields::DEVICE_ID, record))
    }

    pub fn extract_model(&self, record: &str) -> Result<String, ParseFailure> {
        self.capture_owned(&self.model_re, record, fields::MODEL)
    }

    /// Log and count a parse miss
    pub fn report(&self, failure: &ParseFailure) {
        warn!(field = failure.field, record = %failure.record, "Telemetry parse failure");
        self.metrics.inc_parse_failures(failure.field);
    }

    fn capture<'a>(&self, re: &Regex, record: &'a str) -> Option<&'a str> {
        re.captures(record)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    fn capture_owned(
        &self,
        re: &Regex,
        record: &str,
        field: &'static str,
    ) -> Result<String, ParseFailure> {
        self.capture(re, record)
            .map(unescape_label_value)
            .ok_or_else(|| failure(field, record))
    }
}

/// Render a sample the way instant query results are handed to the parser:
/// `name{a="1", b="2"} => value @[timestamp]`, labels in name order.
pub fn render_record(
    metric_name: &str,
    labels: &BTreeMap<String, String>,
    value: &str,
    timestamp: f64,
) -> String {
    let labels = labels
        .iter()
        .map(|(name, value)| format!("{}=\"{}\"", name, escape_label_value(value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}{{{}}} => {} @[{:.3}]", metric_name, labels, value, timestamp)
}

fn unescape_label_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(escaped) => out.push(escaped),
            None => out.push('\\'),
        }
    }
    out
}

fn failure(field: &'static str, record: &str) -> ParseFailure {
    ParseFailure {
        field,
        record: record.to_string(),
    }
}

fn compile(pattern: &str) -> Regex {
    // Patterns are built from escaped input, so compilation cannot fail.
    Regex::new(pattern).expect("telemetry pattern must compile")
}
