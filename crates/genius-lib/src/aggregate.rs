//! Cluster-wide sums used as scoring denominators

use crate::models::{ClusterSnapshot, DeviceSnapshot};
use serde::{Deserialize, Serialize};

/// Sums of every numeric device field across all nodes of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAggregate {
    pub device_count: u64,

    pub memory_capacity_mb: u64,
    pub multiprocessor_count: u64,
    pub shared_decoder_count: u64,
    pub shared_encoder_count: u64,
    pub bandwidth: u64,

    pub decoder_utilization_pct: u64,
    pub encoder_utilization_pct: u64,
    pub memory_utilization_pct: u64,
    pub power_watts: u64,
    pub used_memory_mb: u64,
    pub free_memory_mb: u64,
}

impl ClusterAggregate {
    pub fn from_snapshot(snapshot: &ClusterSnapshot) -> Self {
        snapshot
            .nodes()
            .fold(Self::default(), |acc, (_, devices)| acc.merge(&Self::from_devices(devices)))
    }

    /// Sums over a single device list, e.g. one node
    pub fn from_devices(devices: &[DeviceSnapshot]) -> Self {
        devices.iter().fold(Self::default(), |mut acc, d| {
            acc.add_device(d);
            acc
        })
    }

    fn add_device(&mut self, d: &DeviceSnapshot) {
        let s = &d.static_attrs;
        let dy = &d.dynamic_attrs;

        self.device_count += 1;
        self.memory_capacity_mb = self.memory_capacity_mb.saturating_add(s.memory_capacity_mb);
        self.multiprocessor_count = self
            .multiprocessor_count
            .saturating_add(u64::from(s.multiprocessor_count));
        self.shared_decoder_count = self
            .shared_decoder_count
            .saturating_add(u64::from(s.shared_decoder_count));
        self.shared_encoder_count = self
            .shared_encoder_count
            .saturating_add(u64::from(s.shared_encoder_count));
        self.bandwidth = self.bandwidth.saturating_add(s.bandwidth);

        self.decoder_utilization_pct = self
            .decoder_utilization_pct
            .saturating_add(u64::from(dy.decoder_utilization_pct));
        self.encoder_utilization_pct = self
            .encoder_utilization_pct
            .saturating_add(u64::from(dy.encoder_utilization_pct));
        self.memory_utilization_pct = self
            .memory_utilization_pct
            .saturating_add(u64::from(dy.memory_utilization_pct));
        self.power_watts = self.power_watts.saturating_add(u64::from(dy.power_watts));
        self.used_memory_mb = self.used_memory_mb.saturating_add(dy.used_memory_mb);
        self.free_memory_mb = self.free_memory_mb.saturating_add(dy.free_memory_mb);
    }

    fn merge(self, other: &Self) -> Self {
        Self {
            device_count: self.device_count + other.device_count,
            memory_capacity_mb: self.memory_capacity_mb.saturating_add(other.memory_capacity_mb),
            multiprocessor_count: self
                .multiprocessor_count
                .saturating_add(other.multiprocessor_count),
            shared_decoder_count: self
                .shared_decoder_count
                .saturating_add(other.shared_decoder_count),
            shared_encoder_count: self
                .shared_encoder_count
                .saturating_add(other.shared_encoder_count),
            bandwidth: self.bandwidth.saturating_add(other.bandwidth),
            decoder_utilization_pct: self
                .decoder_utilization_pct
                .saturating_add(other.decoder_utilization_pct),
            encoder_utilization_pct: self
                .encoder_utilization_pct
                .saturating_add(other.encoder_utilization_pct),
            memory_utilization_pct: self
                .memory_utilization_pct
                .saturating_add(other.memory_utilization_pct),
            power_watts: self.power_watts.saturating_add(other.power_watts),
            used_memory_mb: self.used_memory_mb.saturating_add(other.used_memory_mb),
            free_memory_mb: self.free_memory_mb.saturating_add(other.free_memory_mb),
        }
    }

    /// Unused decoder capacity, `100 * devices - Σ utilization`
    pub fn idle_decoder_pct(&self) -> u64 {
        idle_capacity(self.device_count, self.decoder_utilization_pct)
    }

    /// Unused encoder capacity, `100 * devices - Σ utilization`
    pub fn idle_encoder_pct(&self) -> u64 {
        idle_capacity(self.device_count, self.encoder_utilization_pct)
    }
}

fn idle_capacity(device_count: u64, utilization_sum: u64) -> u64 {
    device_count
        .saturating_mul(100)
        .saturating_sub(utilization_sum)
}
