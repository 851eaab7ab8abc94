//! Tests for cluster snapshot collection
//!
//! These use an in-memory telemetry backend so discovery, querying and record
//! assembly can be exercised without a Prometheus server.

use super::*;
use crate::test_support::{device_records, full_metrics, FailOn, FakeBackend};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn collector(backend: FakeBackend) -> ClusterCollector {
    ClusterCollector::new(Arc::new(backend), TelemetryConfig::default())
}

#[tokio::test]
async fn test_collect_two_nodes() {
    let backend = FakeBackend::new()
        .with_device("node-a", 0, "Tesla T4", &full_metrics(4096))
        .with_device("node-a", 1, "Tesla T4", &full_metrics(8192))
        .with_device("node-b", 0, "A100-SXM4-40GB", &full_metrics(1024));

    let snapshot = collector(backend).collect_cluster_snapshot().await.unwrap();

    assert_eq!(snapshot.node_count(), 2);
    assert_eq!(snapshot.device_count(), 3);

    let a = snapshot.devices("node-a");
    assert_eq!(a[0].id(), 0);
    assert_eq!(a[1].id(), 1);
    assert_eq!(a[0].free_memory_mb(), 4096);
    assert_eq!(a[1].free_memory_mb(), 8192);
    assert_eq!(a[0].model(), "Tesla T4");
    assert_eq!(a[0].static_attrs.uuid, "GPU-node-a-0");

    assert_eq!(snapshot.devices("node-b")[0].model(), "A100-SXM4-40GB");
}

#[tokio::test]
async fn test_every_metric_lands_in_its_field() {
    let values = vec![
        (MetricKind::DecoderUtilization, 11),
        (MetricKind::EncoderUtilization, 12),
        (MetricKind::MemoryUtilization, 13),
        (MetricKind::PowerUsage, 14),
        (MetricKind::UsedMemory, 15),
        (MetricKind::FreeMemory, 16),
        (MetricKind::MemorySize, 17),
        (MetricKind::MultiprocessorCount, 18),
        (MetricKind::SharedDecoderCount, 19),
        (MetricKind::SharedEncoderCount, 20),
    ];
    let backend = FakeBackend::new().with_device("n", 0, "T4", &values);

    let snapshot = collector(backend).collect_cluster_snapshot().await.unwrap();
    let d = &snapshot.devices("n")[0];

    assert_eq!(d.dynamic_attrs.decoder_utilization_pct, 11);
    assert_eq!(d.dynamic_attrs.encoder_utilization_pct, 12);
    assert_eq!(d.dynamic_attrs.memory_utilization_pct, 13);
    assert_eq!(d.dynamic_attrs.power_watts, 14);
    assert_eq!(d.dynamic_attrs.used_memory_mb, 15);
    assert_eq!(d.dynamic_attrs.free_memory_mb, 16);
    assert_eq!(d.static_attrs.memory_capacity_mb, 17);
    assert_eq!(d.static_attrs.multiprocessor_count, 18);
    assert_eq!(d.static_attrs.shared_decoder_count, 19);
    // Shared encoder count must not overwrite encoder utilization.
    assert_eq!(d.static_attrs.shared_encoder_count, 20);
    assert_eq!(d.static_attrs.bandwidth, 0);
}

#[tokio::test]
async fn test_empty_cluster_is_valid() {
    let snapshot = collector(FakeBackend::new())
        .collect_cluster_snapshot()
        .await
        .unwrap();

    assert!(snapshot.is_empty());
    assert_eq!(snapshot.device_count(), 0);
}

#[tokio::test]
async fn test_node_without_devices_is_kept() {
    let backend = FakeBackend::new()
        .with_node("cpu-only")
        .with_device("gpu", 0, "T4", &full_metrics(100));

    let snapshot = collector(backend).collect_cluster_snapshot().await.unwrap();

    assert!(snapshot.contains_node("cpu-only"));
    assert!(snapshot.devices("cpu-only").is_empty());
    assert_eq!(snapshot.device_count(), 1);
}

#[tokio::test]
async fn test_missing_records_leave_zero_values() {
    let metrics = SchedulerMetrics::new();
    let before = metrics.record_mismatches();
    let backend = FakeBackend::new().with_device(
        "n",
        0,
        "T4",
        &[(MetricKind::FreeMemory, 2048), (MetricKind::PowerUsage, 30)],
    );

    let snapshot = collector(backend).collect_cluster_snapshot().await.unwrap();
    let d = &snapshot.devices("n")[0];

    assert_eq!(d.dynamic_attrs.free_memory_mb, 2048);
    assert_eq!(d.dynamic_attrs.power_watts, 30);
    assert_eq!(d.static_attrs.memory_capacity_mb, 0);
    assert!(metrics.record_mismatches() > before);
}

#[tokio::test]
async fn test_node_discovery_failure_aborts() {
    let backend = FakeBackend::new()
        .with_device("n", 0, "T4", &full_metrics(1))
        .failing(FailOn::NodeDiscovery);

    let err = collector(backend).collect_cluster_snapshot().await.unwrap_err();
    assert!(matches!(err, TelemetryError::Transport(_)));
}

#[tokio::test]
async fn test_device_discovery_failure_aborts() {
    let backend = FakeBackend::new()
        .with_device("n", 0, "T4", &full_metrics(1))
        .failing(FailOn::DeviceDiscovery);

    assert!(collector(backend).collect_cluster_snapshot().await.is_err());
}

#[tokio::test]
async fn test_query_failure_aborts() {
    let backend = FakeBackend::new()
        .with_device("n", 0, "T4", &full_metrics(1))
        .failing(FailOn::Query);

    assert!(collector(backend).collect_cluster_snapshot().await.is_err());
}

#[tokio::test]
async fn test_device_queries_run_concurrently() {
    let mut backend = FakeBackend::new();
    for id in 0..4u32 {
        backend = backend.with_device("n", id, "T4", &full_metrics(100 * (id as u64 + 1)));
    }
    let backend = Arc::new(backend.delayed(Duration::from_millis(50)));

    let snapshot = ClusterCollector::new(backend.clone(), TelemetryConfig::default())
        .collect_cluster_snapshot()
        .await
        .unwrap();

    assert!(backend.max_in_flight.load(Ordering::SeqCst) > 1);
    let free: Vec<u64> = snapshot
        .devices("n")
        .iter()
        .map(|d| d.free_memory_mb())
        .collect();
    assert_eq!(free, vec![100, 200, 300, 400]);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = FakeBackend::new()
        .with_device("n", 0, "T4", &full_metrics(1))
        .delayed(Duration::from_millis(500));
    let config = TelemetryConfig {
        query_timeout: Duration::from_millis(20),
        ..TelemetryConfig::default()
    };

    let err = ClusterCollector::new(Arc::new(backend), config)
        .collect_cluster_snapshot()
        .await
        .unwrap_err();

    assert!(matches!(err, TelemetryError::Timeout { .. }));
}

#[tokio::test]
async fn test_non_numeric_device_label_falls_back_to_record_id() {
    let text = device_records("n", 3, "T4", &full_metrics(64));
    let backend = FakeBackend::new().with_raw_device("n", "gpu-three", &text);
    let metrics = SchedulerMetrics::new();
    let before = metrics.parse_failures(fields::DEVICE_ID);

    let collector = collector(backend);
    let d = collector.assemble_device("n", "gpu-three", &text);

    assert_eq!(d.id(), 3);
    assert!(metrics.parse_failures(fields::DEVICE_ID) > before);
}

#[test]
fn test_records_from_other_nodes_are_skipped() {
    let own = device_records("n", 0, "T4", &[(MetricKind::FreeMemory, 100)]);
    let other = device_records("m", 0, "T4", &[(MetricKind::PowerUsage, 999)]);
    let text = format!("{}\n{}", own, other);

    let d = collector(FakeBackend::new()).assemble_device("n", "0", &text);

    assert_eq!(d.free_memory_mb(), 100);
    assert_eq!(d.dynamic_attrs.power_watts, 0);
}

#[test]
fn test_garbage_lines_are_tolerated() {
    let mut text = device_records("n", 0, "T4", &full_metrics(512));
    text.push_str("\n\nthis is not a record\n");

    let d = collector(FakeBackend::new()).assemble_device("n", "0", &text);

    assert_eq!(d.free_memory_mb(), 512);
    assert_eq!(d.static_attrs.multiprocessor_count, 40);
}

#[test]
fn test_oversized_values_saturate() {
    let mut d = DeviceSnapshot::default();
    apply_metric(&mut d, MetricKind::PowerUsage, u64::MAX);
    apply_metric(&mut d, MetricKind::FreeMemory, u64::MAX);

    assert_eq!(d.dynamic_attrs.power_watts, u32::MAX);
    assert_eq!(d.dynamic_attrs.free_memory_mb, u64::MAX);
}
