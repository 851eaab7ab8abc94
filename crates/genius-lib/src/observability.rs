//! Observability infrastructure for the scheduling engine
//!
//! Provides:
//! - Prometheus metrics (collection and cycle latency, telemetry drift, filter outcomes)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SchedulerMetricsInner> = OnceLock::new();

struct SchedulerMetricsInner {
    collection_latency_seconds: Histogram,
    cycle_latency_seconds: Histogram,
    collection_errors: IntCounter,
    parse_failures: IntCounterVec,
    record_mismatches: IntCounter,
    requirement_label_errors: IntCounterVec,
    cluster_nodes: IntGauge,
    cluster_devices: IntGauge,
    nodes_filtered: IntCounterVec,
}

impl SchedulerMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "genius_collection_latency_seconds",
                "Time spent collecting the cluster snapshot from the telemetry backend",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            cycle_latency_seconds: register_histogram!(
                "genius_cycle_latency_seconds",
                "Time spent on a full collect, filter, score and normalize cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            collection_errors: register_int_counter!(
                "genius_collection_errors_total",
                "Total number of cycles aborted because telemetry collection failed"
            )
            .expect("Failed to register collection_errors"),

            parse_failures: register_int_counter_vec!(
                "genius_telemetry_parse_failures_total",
                "Total number of telemetry record fields that could not be parsed",
                &["field"]
            )
            .expect("Failed to register parse_failures"),

            record_mismatches: register_int_counter!(
                "genius_telemetry_record_mismatch_total",
                "Total number of devices whose query returned an unexpected number of records"
            )
            .expect("Failed to register record_mismatches"),

            requirement_label_errors: register_int_counter_vec!(
                "genius_requirement_label_errors_total",
                "Total number of malformed requirement labels treated as absent",
                &["label"]
            )
            .expect("Failed to register requirement_label_errors"),

            cluster_nodes: register_int_gauge!(
                "genius_cluster_nodes",
                "Number of nodes in the last collected cluster snapshot"
            )
            .expect("Failed to register cluster_nodes"),

            cluster_devices: register_int_gauge!(
                "genius_cluster_devices",
                "Number of GPUs in the last collected cluster snapshot"
            )
            .expect("Failed to register cluster_devices"),

            nodes_filtered: register_int_counter_vec!(
                "genius_nodes_filtered_total",
                "Total number of candidate nodes evaluated by the fitness filter",
                &["result"]
            )
            .expect("Failed to register nodes_filtered"),
        }
    }
}

/// Scheduler metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance. Clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct SchedulerMetrics {
    _private: (),
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SchedulerMetricsInner {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    /// Count a telemetry field that fell back to its zero value
    pub fn inc_parse_failures(&self, field: &str) {
        self.inner().parse_failures.with_label_values(&[field]).inc();
    }

    pub fn parse_failures(&self, field: &str) -> u64 {
        self.inner().parse_failures.with_label_values(&[field]).get()
    }

    pub fn inc_record_mismatches(&self) {
        self.inner().record_mismatches.inc();
    }

    pub fn record_mismatches(&self) -> u64 {
        self.inner().record_mismatches.get()
    }

    pub fn inc_requirement_label_errors(&self, label: &str) {
        self.inner()
            .requirement_label_errors
            .with_label_values(&[label])
            .inc();
    }

    pub fn requirement_label_errors(&self, label: &str) -> u64 {
        self.inner()
            .requirement_label_errors
            .with_label_values(&[label])
            .get()
    }

    pub fn set_cluster_size(&self, nodes: i64, devices: i64) {
        self.inner().cluster_nodes.set(nodes);
        self.inner().cluster_devices.set(devices);
    }

    pub fn inc_nodes_filtered(&self, fit: bool) {
        let result = if fit { "fit" } else { "unschedulable" };
        self.inner().nodes_filtered.with_label_values(&[result]).inc();
    }
}

/// Structured logger for scheduler events
///
/// Emits stable `event = "..."` records for cycle milestones so operators can
/// follow placement decisions and spot telemetry drift.
#[derive(Clone)]
pub struct StructuredLogger {
    scheduler_name: String,
}

impl StructuredLogger {
    pub fn new(scheduler_name: impl Into<String>) -> Self {
        Self {
            scheduler_name: scheduler_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, prometheus_url: &str) {
        info!(
            event = "scheduler_started",
            scheduler = %self.scheduler_name,
            version = %version,
            prometheus_url = %prometheus_url,
            "GPU scheduler extender started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scheduler_shutdown",
            scheduler = %self.scheduler_name,
            reason = %reason,
            "GPU scheduler extender shutting down"
        );
    }

    pub fn log_snapshot_collected(&self, nodes: usize, devices: usize, elapsed_ms: u128) {
        info!(
            event = "snapshot_collected",
            scheduler = %self.scheduler_name,
            nodes = nodes,
            devices = devices,
            elapsed_ms = elapsed_ms as u64,
            "Collected cluster GPU snapshot"
        );
    }

    pub fn log_collection_failed(&self, error: &str) {
        error!(
            event = "collection_failed",
            scheduler = %self.scheduler_name,
            error = %error,
            "Collecting cluster GPU metrics failed, aborting cycle"
        );
    }

    pub fn log_node_rejected(&self, request: &str, node: &str, reason: &str) {
        info!(
            event = "node_rejected",
            scheduler = %self.scheduler_name,
            request = %request,
            node = %node,
            reason = %reason,
            "Node does not fit request"
        );
    }

    pub fn log_scores_normalized(&self, request: &str, candidates: usize, best: Option<&str>) {
        info!(
            event = "scores_normalized",
            scheduler = %self.scheduler_name,
            request = %request,
            candidates = candidates,
            best = ?best,
            "Normalized node scores"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_metrics_creation() {
        let metrics = SchedulerMetrics::new();

        metrics.observe_collection_latency(0.01);
        metrics.observe_cycle_latency(0.02);
        metrics.inc_collection_errors();
        metrics.set_cluster_size(3, 8);
        metrics.inc_nodes_filtered(true);
        metrics.inc_nodes_filtered(false);
    }

    #[test]
    fn test_parse_failure_counter_increments() {
        let metrics = SchedulerMetrics::new();
        let before = metrics.parse_failures("observability_test");
        metrics.inc_parse_failures("observability_test");
        assert_eq!(metrics.parse_failures("observability_test"), before + 1);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("genius");
        assert_eq!(logger.scheduler_name, "genius");
    }
}
