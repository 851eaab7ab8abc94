//! Raw node scoring against cluster aggregates
//!
//! Every factor is a node's share of the cluster total, rescaled by the
//! cluster device count so a node holding an average share per device scores
//! 1.0 per device:
//!
//! ```text
//! factor = node_sum / cluster_sum * cluster_devices
//! ```
//!
//! A zero cluster total makes the factor 0. Encoder and decoder factors use
//! idle capacity (`100 - utilization`) so less loaded nodes score higher.

use crate::aggregate::ClusterAggregate;
use crate::models::DeviceSnapshot;
use serde::{Deserialize, Serialize};

/// Weights of the individual factors and of the two factor groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub memory_capacity: f64,
    pub multiprocessor: f64,
    pub shared_decoder: f64,
    pub shared_encoder: f64,
    pub bandwidth: f64,

    pub free_memory: f64,
    pub power: f64,
    pub encoder_idle: f64,
    pub decoder_idle: f64,

    pub static_group: f64,
    pub dynamic_group: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            memory_capacity: 2.0,
            multiprocessor: 2.0,
            shared_decoder: 1.0,
            shared_encoder: 1.0,
            bandwidth: 2.0,
            free_memory: 2.0,
            power: 1.0,
            encoder_idle: 1.0,
            decoder_idle: 1.0,
            static_group: 1.0,
            dynamic_group: 2.0,
        }
    }
}

/// Weighted sums of the static and dynamic factor groups
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub static_score: f64,
    pub dynamic_score: f64,
}

/// Raw score of one node for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScore {
    pub node_name: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Scores fit nodes with a fixed set of weights
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Raw score of a node's devices against the cluster aggregate
    pub fn score(&self, devices: &[DeviceSnapshot], cluster: &ClusterAggregate) -> f64 {
        let breakdown = self.breakdown(devices, cluster);
        breakdown.static_score * self.weights.static_group
            + breakdown.dynamic_score * self.weights.dynamic_group
    }

    pub fn score_node(
        &self,
        node_name: &str,
        devices: &[DeviceSnapshot],
        cluster: &ClusterAggregate,
    ) -> RawScore {
        let breakdown = self.breakdown(devices, cluster);
        RawScore {
            node_name: node_name.to_string(),
            score: breakdown.static_score * self.weights.static_group
                + breakdown.dynamic_score * self.weights.dynamic_group,
            breakdown,
        }
    }

    pub fn breakdown(&self, devices: &[DeviceSnapshot], cluster: &ClusterAggregate) -> ScoreBreakdown {
        if devices.is_empty() {
            return ScoreBreakdown::default();
        }

        let node = ClusterAggregate::from_devices(devices);
        let n = cluster.device_count;
        let w = &self.weights;

        let static_score = w.memory_capacity
            * share(node.memory_capacity_mb, cluster.memory_capacity_mb, n)
            + w.multiprocessor * share(node.multiprocessor_count, cluster.multiprocessor_count, n)
            + w.shared_decoder * share(node.shared_decoder_count, cluster.shared_decoder_count, n)
            + w.shared_encoder * share(node.shared_encoder_count, cluster.shared_encoder_count, n)
            + w.bandwidth * share(node.bandwidth, cluster.bandwidth, n);

        let dynamic_score = w.free_memory * share(node.free_memory_mb, cluster.free_memory_mb, n)
            + w.power * share(node.power_watts, cluster.power_watts, n)
            + w.encoder_idle * share(node.idle_encoder_pct(), cluster.idle_encoder_pct(), n)
            + w.decoder_idle * share(node.idle_decoder_pct(), cluster.idle_decoder_pct(), n);

        ScoreBreakdown {
            static_score,
            dynamic_score,
        }
    }
}

/// `part / total * device_count`, or 0 when the total is zero
fn share(part: u64, total: u64, device_count: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * device_count as f64
}
