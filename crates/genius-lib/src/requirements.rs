//! Workload requests and the GPU requirements declared in their labels
//!
//! Requirements are read from well-known labels. A missing label leaves the
//! requirement unconstrained; a malformed one is logged, counted and treated
//! as missing rather than failing the request.

use crate::observability::SchedulerMetrics;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Label keys read from a workload request
pub mod labels {
    pub const GPU_NUMBER: &str = "genius/gpu-number";
    pub const GPU_MEMORY_EACH: &str = "genius/gpu-memory-each";
    pub const GPU_MEMORY_TOTAL: &str = "genius/gpu-memory-total";
    pub const GPU_MODEL: &str = "genius/gpu-model";
    pub const PRIORITY: &str = "genius/priority";
}

/// A pending workload as seen by the host scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRequest {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl WorkloadRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn requirements(&self) -> RequestRequirements {
        RequestRequirements::from_labels(&self.labels)
    }
}

/// Case-insensitive pattern matched against device model names
///
/// The pattern is a regular expression searched anywhere in the model, so
/// `t4` matches `Tesla T4`; anchor it (`^tesla t4$`) for an exact match.
#[derive(Clone)]
pub struct ModelPattern {
    source: String,
    regex: Regex,
}

impl ModelPattern {
    /// Compile `pattern`; an invalid expression is matched literally instead
    pub fn new(pattern: &str) -> Self {
        let regex = match build_case_insensitive(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(
                    label = labels::GPU_MODEL,
                    pattern = %pattern,
                    error = %e,
                    "Invalid model pattern, matching it literally"
                );
                SchedulerMetrics::new().inc_requirement_label_errors(labels::GPU_MODEL);
                build_case_insensitive(&regex::escape(pattern))
                    .expect("escaped pattern is a valid regex")
            }
        };

        Self {
            source: pattern.to_string(),
            regex,
        }
    }

    pub fn is_match(&self, model: &str) -> bool {
        self.regex.is_match(model)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn build_case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

impl fmt::Debug for ModelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelPattern").field(&self.source).finish()
    }
}

impl PartialEq for ModelPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// GPU requirements of one workload request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestRequirements {
    pub required_device_count: Option<usize>,
    pub per_device_free_memory_mb: Option<u64>,
    pub total_free_memory_mb: Option<u64>,
    pub model_pattern: Option<ModelPattern>,
    pub priority: Option<i64>,
}

impl RequestRequirements {
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        Self {
            required_device_count: parse_label(labels, labels::GPU_NUMBER),
            per_device_free_memory_mb: parse_label(labels, labels::GPU_MEMORY_EACH),
            total_free_memory_mb: parse_label(labels, labels::GPU_MEMORY_TOTAL),
            model_pattern: labels
                .get(labels::GPU_MODEL)
                .map(|pattern| ModelPattern::new(pattern)),
            priority: parse_label(labels, labels::PRIORITY),
        }
    }

    /// Declared priority, 0 when absent
    pub fn effective_priority(&self) -> i64 {
        self.priority.unwrap_or(0)
    }
}

/// Parse a numeric label; malformed values count as absent
fn parse_label<T: FromStr>(labels: &BTreeMap<String, String>, key: &str) -> Option<T> {
    let raw = labels.get(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(label = %key, value = %raw, "Malformed requirement label, treating it as absent");
            SchedulerMetrics::new().inc_requirement_label_errors(key);
            None
        }
    }
}
