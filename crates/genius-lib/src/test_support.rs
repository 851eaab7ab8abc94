//! Shared fixtures for unit tests: an in-memory telemetry backend and
//! snapshot builders.

use crate::error::{TelemetryError, TelemetryResult};
use crate::models::{ClusterSnapshot, DeviceSnapshot};
use crate::telemetry::{render_record, MetricKind, TelemetryBackend};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Which backend call should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    NodeDiscovery,
    DeviceDiscovery,
    Query,
}

/// Telemetry backend answering from canned per-device records
#[derive(Default)]
pub struct FakeBackend {
    /// node -> device label value -> query text
    nodes: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    fail_on: Option<FailOn>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub label_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    /// Most queries observed running at the same time
    pub max_in_flight: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, fail_on: FailOn) -> Self {
        self.fail_on = Some(fail_on);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_node(self, node: &str) -> Self {
        self.nodes.lock().unwrap().entry(node.to_string()).or_default();
        self
    }

    /// Add a device whose query answers with `text` verbatim
    pub fn with_raw_device(self, node: &str, device_label: &str, text: &str) -> Self {
        self.nodes
            .lock()
            .unwrap()
            .entry(node.to_string())
            .or_default()
            .insert(device_label.to_string(), text.to_string());
        self
    }

    /// Add a device exporting all ten metrics for `values`
    pub fn with_device(self, node: &str, id: u32, model: &str, values: &[(MetricKind, u64)]) -> Self {
        let text = device_records(node, id, model, values);
        self.with_raw_device(node, &id.to_string(), &text)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn fail(&self, call: FailOn) -> TelemetryResult<()> {
        if self.fail_on == Some(call) {
            return Err(TelemetryError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryBackend for FakeBackend {
    async fn label_values(
        &self,
        label: &str,
        selector: &str,
        _window: Duration,
    ) -> TelemetryResult<Vec<String>> {
        self.label_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let nodes = self.nodes.lock().unwrap().clone();
        match label {
            "kubernetes_node" => {
                self.fail(FailOn::NodeDiscovery)?;
                Ok(nodes.keys().cloned().collect())
            }
            _ => {
                self.fail(FailOn::DeviceDiscovery)?;
                Ok(nodes
                    .iter()
                    .find(|(node, _)| selector.contains(&format!("kubernetes_node=\"{}\"", node)))
                    .map(|(_, devices)| devices.keys().cloned().collect())
                    .unwrap_or_default())
            }
        }
    }

    async fn query(&self, selector: &str) -> TelemetryResult<String> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.pause().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.fail(FailOn::Query)?;

        let nodes = self.nodes.lock().unwrap().clone();
        let text = nodes
            .iter()
            .filter(|(node, _)| selector.contains(&format!("kubernetes_node=\"{}\"", node)))
            .flat_map(|(_, devices)| devices.iter())
            .find(|(id, _)| selector.contains(&format!("id=\"{}\"", id)))
            .map(|(_, text)| text.clone())
            .unwrap_or_default();
        Ok(text)
    }
}

/// Text records for one device, one line per metric in `values`
pub fn device_records(node: &str, id: u32, model: &str, values: &[(MetricKind, u64)]) -> String {
    let labels: BTreeMap<String, String> = [
        ("id", id.to_string()),
        ("kubernetes_node", node.to_string()),
        ("model", model.to_string()),
        ("uuid", format!("GPU-{}-{}", node, id)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    values
        .iter()
        .map(|(kind, value)| {
            let name = format!("observerward_{}", kind.metric_name());
            render_record(&name, &labels, &value.to_string(), 1621255638.419)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A full set of metrics for a device
pub fn full_metrics(free_memory_mb: u64) -> Vec<(MetricKind, u64)> {
    vec![
        (MetricKind::DecoderUtilization, 10),
        (MetricKind::EncoderUtilization, 20),
        (MetricKind::MemoryUtilization, 30),
        (MetricKind::PowerUsage, 70),
        (MetricKind::UsedMemory, 15_109 - free_memory_mb.min(15_109)),
        (MetricKind::FreeMemory, free_memory_mb),
        (MetricKind::MemorySize, 15_109),
        (MetricKind::MultiprocessorCount, 40),
        (MetricKind::SharedDecoderCount, 2),
        (MetricKind::SharedEncoderCount, 1),
    ]
}

/// A device with the given id, model and free memory; other fields zero
pub fn device(id: u32, model: &str, free_memory_mb: u64) -> DeviceSnapshot {
    let mut d = DeviceSnapshot::default();
    d.static_attrs.id = id;
    d.static_attrs.model = model.to_string();
    d.dynamic_attrs.free_memory_mb = free_memory_mb;
    d
}

/// Snapshot from `(node, devices)` pairs
pub fn snapshot(nodes: Vec<(&str, Vec<DeviceSnapshot>)>) -> ClusterSnapshot {
    let mut snapshot = ClusterSnapshot::new();
    for (node, devices) in nodes {
        snapshot.add_node(node);
        for d in devices {
            snapshot.insert_device(node, d);
        }
    }
    snapshot
}
