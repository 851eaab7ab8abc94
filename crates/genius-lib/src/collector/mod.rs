//! Cluster snapshot collection from GPU telemetry
//!
//! Discovers the nodes and devices known to the telemetry backend, queries the
//! current records of every device and assembles a [`ClusterSnapshot`]. Any
//! backend failure aborts the whole collection; parse problems on individual
//! records are logged, counted and replaced with zero values.

#[cfg(test)]
mod tests;

use crate::error::{ParseFailure, TelemetryError, TelemetryResult};
use crate::models::{ClusterSnapshot, DeviceSnapshot};
use crate::observability::SchedulerMetrics;
use crate::telemetry::{
    fields, MetricKind, TelemetryBackend, TelemetryConfig, TelemetryParser, METRIC_KIND_COUNT,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Builds a fresh [`ClusterSnapshot`] for every scheduling cycle
pub struct ClusterCollector {
    backend: Arc<dyn TelemetryBackend>,
    config: TelemetryConfig,
    parser: TelemetryParser,
    metrics: SchedulerMetrics,
}

impl ClusterCollector {
    pub fn new(backend: Arc<dyn TelemetryBackend>, config: TelemetryConfig) -> Self {
        let parser = config.parser();
        Self {
            backend,
            config,
            parser,
            metrics: SchedulerMetrics::new(),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Collect the GPUs of every node seen by the backend within the label window
    pub async fn collect_cluster_snapshot(&self) -> TelemetryResult<ClusterSnapshot> {
        let start = Instant::now();

        match self.collect().await {
            Ok(snapshot) => {
                self.metrics
                    .observe_collection_latency(start.elapsed().as_secs_f64());
                self.metrics
                    .set_cluster_size(snapshot.node_count() as i64, snapshot.device_count() as i64);
                debug!(
                    nodes = snapshot.node_count(),
                    devices = snapshot.device_count(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Cluster snapshot collected"
                );
                Ok(snapshot)
            }
            Err(e) => {
                self.metrics.inc_collection_errors();
                warn!(error = %e, "Cluster snapshot collection failed");
                Err(e)
            }
        }
    }

    async fn collect(&self) -> TelemetryResult<ClusterSnapshot> {
        let mut snapshot = ClusterSnapshot::new();

        for node in self.discover_nodes().await? {
            snapshot.add_node(node.clone());

            let device_labels = self.discover_devices(&node).await?;
            let texts = self.query_devices(&node, &device_labels).await?;

            for (device_label, text) in device_labels.iter().zip(texts) {
                let device = self.assemble_device(&node, device_label, &text);
                let device_id = device.id();
                if !snapshot.insert_device(&node, device) {
                    warn!(
                        node = %node,
                        device_id = device_id,
                        "Duplicate device id on node, dropping device"
                    );
                }
            }
        }

        Ok(snapshot)
    }

    /// Distinct node names, sorted
    async fn discover_nodes(&self) -> TelemetryResult<Vec<String>> {
        let selector = self.config.selector().render();
        let values = bounded(
            self.config.query_timeout,
            "node discovery",
            self.backend
                .label_values(&self.config.node_label, &selector, self.config.label_window),
        )
        .await?;
        Ok(distinct(values))
    }

    /// Distinct device label values observed on `node`, sorted
    async fn discover_devices(&self, node: &str) -> TelemetryResult<Vec<String>> {
        let selector = self
            .config
            .selector()
            .with_label(&self.config.node_label, node)
            .render();
        let values = bounded(
            self.config.query_timeout,
            "device discovery",
            self.backend
                .label_values(&self.config.device_label, &selector, self.config.label_window),
        )
        .await?;
        debug!(node = %node, devices = values.len(), "Discovered devices");
        Ok(distinct(values))
    }

    /// Query every device of `node` concurrently, answers in `device_labels` order
    ///
    /// The first failed query aborts the queries still in flight.
    async fn query_devices(
        &self,
        node: &str,
        device_labels: &[String],
    ) -> TelemetryResult<Vec<String>> {
        let mut tasks = JoinSet::new();

        for (index, device_label) in device_labels.iter().enumerate() {
            let selector = self
                .config
                .selector()
                .with_label(&self.config.node_label, node)
                .with_label(&self.config.device_label, device_label)
                .render();
            let backend = Arc::clone(&self.backend);
            let timeout = self.config.query_timeout;

            tasks.spawn(async move {
                let text = bounded(timeout, "device query", backend.query(&selector)).await;
                (index, text)
            });
        }

        let mut texts = vec![String::new(); device_labels.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, text) = joined.map_err(|e| {
                TelemetryError::Transport(format!("device query on node {} aborted: {}", node, e))
            })?;
            texts[index] = text?;
        }

        Ok(texts)
    }

    /// Build one device from the text records of an instant query
    ///
    /// Missing or unparseable metrics leave their field at zero.
    pub fn assemble_device(&self, node: &str, device_label: &str, text: &str) -> DeviceSnapshot {
        let records: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        if records.len() != METRIC_KIND_COUNT {
            self.metrics.inc_record_mismatches();
            warn!(
                node = %node,
                device = %device_label,
                records = records.len(),
                expected = METRIC_KIND_COUNT,
                "Unexpected number of telemetry records for device"
            );
        }

        let mut device = DeviceSnapshot::default();
        let mut record_id = None;

        for record in records {
            let parsed = self.parser.parse_record(record);

            if let Some(record_node) = parsed.node_name.as_deref() {
                if record_node != node {
                    warn!(
                        node = %node,
                        record_node = %record_node,
                        "Telemetry record belongs to another node, skipping"
                    );
                    continue;
                }
            }

            if device.static_attrs.uuid.is_empty() {
                if let Some(uuid) = parsed.uuid {
                    device.static_attrs.uuid = uuid;
                }
            }
            if device.static_attrs.model.is_empty() {
                if let Some(model) = parsed.model {
                    device.static_attrs.model = model;
                }
            }
            record_id = record_id.or(parsed.device_id);

            if let Some(kind) = parsed.kind {
                apply_metric(&mut device, kind, parsed.value);
            }
        }

        device.static_attrs.id = match device_label.parse::<u32>() {
            Ok(id) => id,
            Err(_) => {
                self.parser.report(&ParseFailure {
                    field: fields::DEVICE_ID,
                    record: device_label.to_string(),
                });
                record_id.unwrap_or(0)
            }
        };

        device
    }
}

/// Run one backend call under the configured query timeout
async fn bounded<T>(
    timeout: Duration,
    operation: &'static str,
    call: impl Future<Output = TelemetryResult<T>>,
) -> TelemetryResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(TelemetryError::Timeout { operation, timeout }),
    }
}

/// Store a parsed metric value in its device field
pub fn apply_metric(device: &mut DeviceSnapshot, kind: MetricKind, value: u64) {
    let dynamic = &mut device.dynamic_attrs;
    let fixed = &mut device.static_attrs;

    match kind {
        MetricKind::DecoderUtilization => dynamic.decoder_utilization_pct = saturate_u32(value),
        MetricKind::EncoderUtilization => dynamic.encoder_utilization_pct = saturate_u32(value),
        MetricKind::MemoryUtilization => dynamic.memory_utilization_pct = saturate_u32(value),
        MetricKind::PowerUsage => dynamic.power_watts = saturate_u32(value),
        MetricKind::UsedMemory => dynamic.used_memory_mb = value,
        MetricKind::FreeMemory => dynamic.free_memory_mb = value,
        MetricKind::MemorySize => fixed.memory_capacity_mb = value,
        MetricKind::MultiprocessorCount => fixed.multiprocessor_count = saturate_u32(value),
        MetricKind::SharedDecoderCount => fixed.shared_decoder_count = saturate_u32(value),
        MetricKind::SharedEncoderCount => fixed.shared_encoder_count = saturate_u32(value),
    }
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn distinct(mut values: Vec<String>) -> Vec<String> {
    values.retain(|v| !v.is_empty());
    values.sort();
    values.dedup();
    values
}
