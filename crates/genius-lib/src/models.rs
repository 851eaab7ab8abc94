//! Core data models for the scheduling engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable capabilities of a single GPU, set when the device is first observed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStaticAttributes {
    /// Index of the device on its node
    pub id: u32,
    pub uuid: String,
    pub model: String,
    pub memory_capacity_mb: u64,
    pub multiprocessor_count: u32,
    pub shared_decoder_count: u32,
    pub shared_encoder_count: u32,
    pub bandwidth: u64,
}

/// Live utilization telemetry of a single GPU, refreshed every cycle
///
/// `used_memory_mb + free_memory_mb` is expected to be close to the device
/// capacity, but telemetry is advisory and nothing here relies on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDynamicAttributes {
    pub decoder_utilization_pct: u32,
    pub encoder_utilization_pct: u32,
    pub memory_utilization_pct: u32,
    pub power_watts: u32,
    pub used_memory_mb: u64,
    pub free_memory_mb: u64,
}

/// Static and dynamic view of one device for one scheduling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(rename = "static")]
    pub static_attrs: DeviceStaticAttributes,
    #[serde(rename = "dynamic")]
    pub dynamic_attrs: DeviceDynamicAttributes,
}

impl DeviceSnapshot {
    pub fn id(&self) -> u32 {
        self.static_attrs.id
    }

    pub fn model(&self) -> &str {
        &self.static_attrs.model
    }

    pub fn free_memory_mb(&self) -> u64 {
        self.dynamic_attrs.free_memory_mb
    }
}

/// Devices of every node in the cluster, keyed by node name
///
/// Built once per cycle by the collector and never mutated after it has been
/// published. Nodes iterate in name order and each node's devices are kept in
/// ascending id order, so everything derived from a snapshot is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    nodes: BTreeMap<String, Vec<DeviceSnapshot>>,
}

impl ClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no devices yet. Existing nodes are left untouched.
    pub fn add_node(&mut self, node_name: impl Into<String>) {
        self.nodes.entry(node_name.into()).or_default();
    }

    /// Insert a device under `node_name`, keeping ids unique and sorted.
    ///
    /// Returns `false` (and leaves the snapshot unchanged) if the node already
    /// holds a device with the same id.
    pub fn insert_device(&mut self, node_name: &str, device: DeviceSnapshot) -> bool {
        let devices = self.nodes.entry(node_name.to_string()).or_default();
        match devices.binary_search_by_key(&device.id(), DeviceSnapshot::id) {
            Ok(_) => false,
            Err(pos) => {
                devices.insert(pos, device);
                true
            }
        }
    }

    /// Devices of a node; a node unknown to telemetry has none.
    pub fn devices(&self, node_name: &str) -> &[DeviceSnapshot] {
        self.nodes.get(node_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_node(&self, node_name: &str) -> bool {
        self.nodes.contains_key(node_name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &[DeviceSnapshot])> {
        self.nodes.iter().map(|(name, devices)| (name.as_str(), devices.as_slice()))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn device_count(&self) -> usize {
        self.nodes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: u32) -> DeviceSnapshot {
        let mut d = DeviceSnapshot::default();
        d.static_attrs.id = id;
        d
    }

    #[test]
    fn test_insert_device_keeps_ids_sorted() {
        let mut snapshot = ClusterSnapshot::new();
        assert!(snapshot.insert_device("a", device(2)));
        assert!(snapshot.insert_device("a", device(0)));
        assert!(snapshot.insert_device("a", device(1)));

        let ids: Vec<u32> = snapshot.devices("a").iter().map(DeviceSnapshot::id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_insert_device_rejects_duplicate_id() {
        let mut snapshot = ClusterSnapshot::new();
        assert!(snapshot.insert_device("a", device(0)));
        assert!(!snapshot.insert_device("a", device(0)));
        assert_eq!(snapshot.devices("a").len(), 1);
    }

    #[test]
    fn test_unknown_node_has_no_devices() {
        let mut snapshot = ClusterSnapshot::new();
        snapshot.add_node("empty");

        assert!(snapshot.contains_node("empty"));
        assert!(snapshot.devices("empty").is_empty());
        assert!(snapshot.devices("missing").is_empty());
        assert_eq!(snapshot.node_count(), 1);
        assert_eq!(snapshot.device_count(), 0);
    }

    #[test]
    fn test_nodes_iterate_in_name_order() {
        let mut snapshot = ClusterSnapshot::new();
        snapshot.add_node("b");
        snapshot.insert_device("a", device(0));
        snapshot.insert_device("c", device(0));
        snapshot.insert_device("c", device(1));

        let names: Vec<&str> = snapshot.nodes().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(snapshot.device_count(), 3);
    }
}
