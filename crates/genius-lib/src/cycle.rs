//! Scheduling cycle driver and host adapter
//!
//! A cycle collects the cluster snapshot exactly once and publishes it behind
//! an `Arc` as an immutable [`CycleState`]. Candidate nodes are then filtered
//! and scored concurrently against that shared state, and normalization runs
//! once every candidate task has finished.

use crate::aggregate::ClusterAggregate;
use crate::collector::ClusterCollector;
use crate::error::{CycleError, CycleResult};
use crate::filter::{self, FilterStatus};
use crate::models::{ClusterSnapshot, DeviceSnapshot};
use crate::normalize::{normalize_scores, NodeScore};
use crate::observability::{SchedulerMetrics, StructuredLogger};
use crate::requirements::{RequestRequirements, WorkloadRequest};
use crate::score::{RawScore, ScoreBreakdown, ScoringEngine, ScoringWeights};
use crate::sort::{self, QueuedRequest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::task::JoinSet;

pub const SCHEDULER_NAME: &str = "genius";

/// Read-only data shared by every filter and score call of one cycle
#[derive(Debug)]
pub struct CycleState {
    snapshot: ClusterSnapshot,
    aggregate: OnceLock<ClusterAggregate>,
}

impl CycleState {
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self {
            snapshot,
            aggregate: OnceLock::new(),
        }
    }

    pub fn snapshot(&self) -> &ClusterSnapshot {
        &self.snapshot
    }

    /// Cluster sums, computed on first use and shared afterwards
    pub fn aggregate(&self) -> &ClusterAggregate {
        self.aggregate
            .get_or_init(|| ClusterAggregate::from_snapshot(&self.snapshot))
    }

    /// Devices of a node; nodes unknown to telemetry have none
    pub fn devices(&self, node_name: &str) -> &[DeviceSnapshot] {
        self.snapshot.devices(node_name)
    }
}

/// A fit node with its scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNode {
    pub node_name: String,
    pub score: u64,
    pub raw_score: f64,
    pub breakdown: ScoreBreakdown,
    pub devices: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedNode {
    pub node_name: String,
    pub reason: String,
}

/// Result of one cycle for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub request: String,
    pub cluster_nodes: usize,
    pub cluster_devices: usize,
    /// Best node first
    pub ranked: Vec<RankedNode>,
    pub rejected: Vec<RejectedNode>,
    pub elapsed_ms: u64,
}

impl CycleReport {
    pub fn best(&self) -> Option<&RankedNode> {
        self.ranked.first()
    }

    pub fn scores(&self) -> Vec<NodeScore> {
        self.ranked
            .iter()
            .map(|r| NodeScore {
                node_name: r.node_name.clone(),
                score: r.score,
            })
            .collect()
    }
}

struct Evaluation {
    node_name: String,
    status: FilterStatus,
    score: Option<RawScore>,
    devices: usize,
}

/// GPU-aware placement plugin driven by the host scheduler
pub struct GeniusPlugin {
    collector: ClusterCollector,
    engine: ScoringEngine,
    max_score: u64,
    metrics: SchedulerMetrics,
    logger: StructuredLogger,
}

impl GeniusPlugin {
    pub fn new(collector: ClusterCollector, weights: ScoringWeights, max_score: u64) -> Self {
        Self {
            collector,
            engine: ScoringEngine::new(weights),
            max_score,
            metrics: SchedulerMetrics::new(),
            logger: StructuredLogger::new(SCHEDULER_NAME),
        }
    }

    pub fn collector(&self) -> &ClusterCollector {
        &self.collector
    }

    pub fn max_score(&self) -> u64 {
        self.max_score
    }

    /// Collect the snapshot for a new cycle
    pub async fn pre_filter(&self) -> CycleResult<Arc<CycleState>> {
        let start = Instant::now();
        match self.collector.collect_cluster_snapshot().await {
            Ok(snapshot) => {
                self.logger.log_snapshot_collected(
                    snapshot.node_count(),
                    snapshot.device_count(),
                    start.elapsed().as_millis(),
                );
                Ok(Arc::new(CycleState::new(snapshot)))
            }
            Err(e) => {
                self.logger.log_collection_failed(&e.to_string());
                Err(CycleError::Collection(e))
            }
        }
    }

    pub fn filter(
        &self,
        state: &CycleState,
        requirements: &RequestRequirements,
        node_name: &str,
    ) -> FilterStatus {
        let status = filter::evaluate(requirements, node_name, state.devices(node_name));
        self.metrics.inc_nodes_filtered(status.is_fit());
        status
    }

    pub fn score(&self, state: &CycleState, node_name: &str) -> RawScore {
        self.engine
            .score_node(node_name, state.devices(node_name), state.aggregate())
    }

    pub fn normalize(&self, raw: &[RawScore]) -> Vec<NodeScore> {
        normalize_scores(raw, self.max_score)
    }

    pub fn less(&self, a: &QueuedRequest, b: &QueuedRequest) -> bool {
        sort::less(a, b)
    }

    /// Collect, filter, score and normalize for one request
    pub async fn run_cycle(
        &self,
        request: &WorkloadRequest,
        candidates: &[String],
    ) -> CycleResult<CycleReport> {
        let start = Instant::now();
        let state = self.pre_filter().await?;
        let mut report = self.evaluate(state, request, candidates).await?;

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        self.metrics
            .observe_cycle_latency(start.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Filter and score candidates against an already collected state
    ///
    /// Duplicate candidate names are evaluated once.
    pub async fn evaluate(
        &self,
        state: Arc<CycleState>,
        request: &WorkloadRequest,
        candidates: &[String],
    ) -> CycleResult<CycleReport> {
        let requirements = Arc::new(request.requirements());
        let unique: BTreeSet<&String> = candidates.iter().collect();

        let mut tasks = JoinSet::new();
        let mut task_nodes = HashMap::new();

        for node_name in unique {
            let state = Arc::clone(&state);
            let requirements = Arc::clone(&requirements);
            let engine = self.engine.clone();
            let node = node_name.clone();

            let handle = tasks.spawn(async move {
                let devices = state.devices(&node);
                let status = filter::evaluate(&requirements, &node, devices);
                let score = status
                    .is_fit()
                    .then(|| engine.score_node(&node, devices, state.aggregate()));
                Evaluation {
                    devices: devices.len(),
                    node_name: node,
                    status,
                    score,
                }
            });
            task_nodes.insert(handle.id(), node_name.clone());
        }

        let mut evaluations = Vec::with_capacity(task_nodes.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(e) => {
                    tasks.abort_all();
                    let node = task_nodes.remove(&e.id()).unwrap_or_default();
                    return Err(CycleError::Task {
                        node,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(self.build_report(&state, request, evaluations))
    }

    fn build_report(
        &self,
        state: &CycleState,
        request: &WorkloadRequest,
        mut evaluations: Vec<Evaluation>,
    ) -> CycleReport {
        evaluations.sort_by(|a, b| a.node_name.cmp(&b.node_name));

        let mut raw = Vec::new();
        let mut device_counts = HashMap::new();
        let mut rejected = Vec::new();

        for evaluation in evaluations {
            self.metrics.inc_nodes_filtered(evaluation.status.is_fit());
            match (evaluation.status, evaluation.score) {
                (FilterStatus::Fit, Some(score)) => {
                    device_counts.insert(evaluation.node_name, evaluation.devices);
                    raw.push(score);
                }
                (status, _) => {
                    let reason = status.to_string();
                    self.logger
                        .log_node_rejected(&request.name, &evaluation.node_name, &reason);
                    rejected.push(RejectedNode {
                        node_name: evaluation.node_name,
                        reason,
                    });
                }
            }
        }

        let normalized = self.normalize(&raw);
        let mut ranked: Vec<RankedNode> = raw
            .into_iter()
            .zip(normalized)
            .map(|(raw, normalized)| RankedNode {
                devices: device_counts.get(&raw.node_name).copied().unwrap_or(0),
                node_name: raw.node_name,
                score: normalized.score,
                raw_score: raw.score,
                breakdown: raw.breakdown,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.node_name.cmp(&b.node_name))
        });

        self.logger.log_scores_normalized(
            &request.name,
            ranked.len(),
            ranked.first().map(|r| r.node_name.as_str()),
        );

        CycleReport {
            request: request.name.clone(),
            cluster_nodes: state.snapshot().node_count(),
            cluster_devices: state.snapshot().device_count(),
            ranked,
            rejected,
            elapsed_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::requirements::labels;
    use crate::telemetry::{MetricKind, TelemetryConfig};
    use crate::test_support::{device, full_metrics, snapshot, FailOn, FakeBackend};

    fn plugin(backend: FakeBackend) -> GeniusPlugin {
        let collector = ClusterCollector::new(Arc::new(backend), TelemetryConfig::default());
        GeniusPlugin::new(collector, ScoringWeights::default(), 100)
    }

    fn names(nodes: &[&str]) -> Vec<String> {
        nodes.iter().map(|n| n.to_string()).collect()
    }

    fn one_gpu() -> WorkloadRequest {
        WorkloadRequest::new("job").with_label(labels::GPU_NUMBER, "1")
    }

    #[test]
    fn test_aggregate_is_computed_once() {
        let state = CycleState::new(snapshot(vec![("a", vec![device(0, "T4", 10)])]));
        let first = state.aggregate() as *const ClusterAggregate;
        let second = state.aggregate() as *const ClusterAggregate;

        assert_eq!(first, second);
        assert_eq!(state.aggregate().device_count, 1);
    }

    #[tokio::test]
    async fn test_fit_and_rejected_nodes() {
        let backend = FakeBackend::new()
            .with_device("A", 0, "X100", &[(MetricKind::FreeMemory, 4096)])
            .with_node("B");

        let report = plugin(backend)
            .run_cycle(&one_gpu(), &names(&["A", "B"]))
            .await
            .unwrap();

        assert_eq!(report.ranked.len(), 1);
        assert_eq!(report.ranked[0].node_name, "A");
        assert_eq!(report.ranked[0].score, 100);
        assert_eq!(
            report.rejected,
            vec![RejectedNode {
                node_name: "B".to_string(),
                reason: "unschedulable node: B".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_candidate_missing_from_telemetry_has_no_devices() {
        let backend = FakeBackend::new().with_device("gpu", 0, "T4", &full_metrics(100));

        let report = plugin(backend)
            .run_cycle(&WorkloadRequest::new("job"), &names(&["gpu", "ghost"]))
            .await
            .unwrap();

        assert_eq!(report.best().map(|r| r.node_name.as_str()), Some("gpu"));
        assert_eq!(report.rejected[0].node_name, "ghost");
    }

    #[tokio::test]
    async fn test_ranking_prefers_free_memory() {
        let backend = FakeBackend::new()
            .with_device("tight", 0, "T4", &full_metrics(1_000))
            .with_device("roomy", 0, "T4", &full_metrics(14_000))
            .with_device("middle", 0, "T4", &full_metrics(7_000));

        let report = plugin(backend)
            .run_cycle(&one_gpu(), &names(&["tight", "roomy", "middle"]))
            .await
            .unwrap();

        let order: Vec<&str> = report.ranked.iter().map(|r| r.node_name.as_str()).collect();
        assert_eq!(order, vec!["roomy", "middle", "tight"]);
        assert_eq!(report.ranked[0].score, 100);
        assert_eq!(report.ranked[2].score, 0);
        assert_eq!(report.cluster_devices, 3);
    }

    #[tokio::test]
    async fn test_equal_scores_tie_on_name() {
        let backend = FakeBackend::new()
            .with_device("b", 0, "T4", &full_metrics(500))
            .with_device("a", 0, "T4", &full_metrics(500));

        let report = plugin(backend)
            .run_cycle(&one_gpu(), &names(&["b", "a"]))
            .await
            .unwrap();

        assert_eq!(report.ranked[0].node_name, "a");
        assert!(report.ranked.iter().all(|r| r.score == 100));
    }

    #[tokio::test]
    async fn test_empty_cluster_rejects_without_error() {
        let report = plugin(FakeBackend::new())
            .run_cycle(&one_gpu(), &names(&["a", "b"]))
            .await
            .unwrap();

        assert!(report.ranked.is_empty());
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.cluster_devices, 0);
    }

    #[tokio::test]
    async fn test_collection_failure_aborts_cycle() {
        let backend = FakeBackend::new()
            .with_device("a", 0, "T4", &full_metrics(1))
            .failing(FailOn::Query);

        let err = plugin(backend)
            .run_cycle(&one_gpu(), &names(&["a"]))
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::Collection(TelemetryError::Transport(_))));
    }

    #[tokio::test]
    async fn test_snapshot_collected_once_per_cycle() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_device("a", 0, "T4", &full_metrics(1))
                .with_device("b", 0, "T4", &full_metrics(2)),
        );
        let collector = ClusterCollector::new(backend.clone(), TelemetryConfig::default());
        let plugin = GeniusPlugin::new(collector, ScoringWeights::default(), 100);

        plugin
            .run_cycle(&one_gpu(), &names(&["a", "b", "a"]))
            .await
            .unwrap();

        // One node discovery, one device discovery per node, one query per device.
        assert_eq!(backend.label_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(backend.query_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_many_candidates_share_state() {
        let devices: Vec<(String, Vec<DeviceSnapshot>)> = (0..64)
            .map(|i| (format!("node-{:02}", i), vec![device(0, "T4", 100 + i)]))
            .collect();
        let snap = snapshot(
            devices
                .iter()
                .map(|(n, d)| (n.as_str(), d.clone()))
                .collect(),
        );
        let candidates: Vec<String> = devices.iter().map(|(n, _)| n.clone()).collect();

        let report = plugin(FakeBackend::new())
            .evaluate(Arc::new(CycleState::new(snap)), &one_gpu(), &candidates)
            .await
            .unwrap();

        assert_eq!(report.ranked.len(), 64);
        assert_eq!(report.ranked[0].node_name, "node-63");
        assert_eq!(report.ranked[63].node_name, "node-00");
    }

    #[tokio::test]
    async fn test_host_callbacks() {
        let backend = FakeBackend::new()
            .with_device("a", 0, "T4", &full_metrics(100))
            .with_device("b", 0, "T4", &full_metrics(300));
        let plugin = plugin(backend);

        let state = plugin.pre_filter().await.unwrap();
        let req = one_gpu().requirements();

        assert!(plugin.filter(&state, &req, "a").is_fit());
        assert!(!plugin.filter(&state, &req, "c").is_fit());

        let raw = vec![plugin.score(&state, "a"), plugin.score(&state, "b")];
        assert!(raw[1].score > raw[0].score);

        let normalized = plugin.normalize(&raw);
        assert_eq!(normalized[0].score, 0);
        assert_eq!(normalized[1].score, plugin.max_score());

        let urgent = QueuedRequest {
            name: "urgent".into(),
            priority: 5,
            enqueue_seq: 1,
        };
        let normal = QueuedRequest {
            name: "normal".into(),
            priority: 0,
            enqueue_seq: 0,
        };
        assert!(plugin.less(&urgent, &normal));
    }
}
