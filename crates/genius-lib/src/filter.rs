//! Fitness predicates deciding whether a node can host a request
//!
//! Each predicate looks only at the devices of one node. A node is fit when
//! all four pass.

use crate::models::DeviceSnapshot;
use crate::requirements::RequestRequirements;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of evaluating one node for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum FilterStatus {
    Fit,
    Unschedulable(String),
}

impl FilterStatus {
    pub fn unschedulable(node_name: &str) -> Self {
        FilterStatus::Unschedulable(format!("unschedulable node: {}", node_name))
    }

    pub fn is_fit(&self) -> bool {
        matches!(self, FilterStatus::Fit)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            FilterStatus::Fit => None,
            FilterStatus::Unschedulable(reason) => Some(reason),
        }
    }
}

impl fmt::Display for FilterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStatus::Fit => write!(f, "fit"),
            FilterStatus::Unschedulable(reason) => write!(f, "{}", reason),
        }
    }
}

/// Which predicate rejected a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    DeviceCount,
    MemoryEach,
    MemoryTotal,
    Model,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Predicate::DeviceCount => "device_count",
            Predicate::MemoryEach => "memory_each",
            Predicate::MemoryTotal => "memory_total",
            Predicate::Model => "model",
        };
        f.write_str(name)
    }
}

/// Device count fitness, also returning the required number used by the
/// other predicates (0 when no count is declared).
///
/// Without a declared count a node still needs at least one device.
pub fn fits_device_count(req: &RequestRequirements, devices: &[DeviceSnapshot]) -> (bool, usize) {
    match req.required_device_count {
        Some(required) => (devices.len() >= required, required),
        None => (!devices.is_empty(), 0),
    }
}

/// At least `required` devices have strictly more free memory than declared
pub fn fits_memory_each(
    req: &RequestRequirements,
    devices: &[DeviceSnapshot],
    required: usize,
) -> bool {
    let Some(threshold) = req.per_device_free_memory_mb else {
        return true;
    };
    let qualifying = devices
        .iter()
        .filter(|d| d.free_memory_mb() > threshold)
        .count();
    qualifying >= required
}

/// Free memory summed over the node reaches the declared total
pub fn fits_memory_total(req: &RequestRequirements, devices: &[DeviceSnapshot]) -> bool {
    let Some(threshold) = req.total_free_memory_mb else {
        return true;
    };
    let total = devices
        .iter()
        .fold(0u64, |sum, d| sum.saturating_add(d.free_memory_mb()));
    total >= threshold
}

/// At least `required` devices match the declared model pattern
pub fn fits_model(req: &RequestRequirements, devices: &[DeviceSnapshot], required: usize) -> bool {
    let Some(pattern) = req.model_pattern.as_ref() else {
        return true;
    };
    let matching = devices.iter().filter(|d| pattern.is_match(d.model())).count();
    matching >= required
}

/// First predicate the devices fail, if any
pub fn first_failed_predicate(
    req: &RequestRequirements,
    devices: &[DeviceSnapshot],
) -> Option<Predicate> {
    let (count_fit, required) = fits_device_count(req, devices);
    if !count_fit {
        return Some(Predicate::DeviceCount);
    }
    if !fits_memory_each(req, devices, required) {
        return Some(Predicate::MemoryEach);
    }
    if !fits_memory_total(req, devices) {
        return Some(Predicate::MemoryTotal);
    }
    if !fits_model(req, devices, required) {
        return Some(Predicate::Model);
    }
    None
}

/// Evaluate all predicates for `node_name`
pub fn evaluate(
    req: &RequestRequirements,
    node_name: &str,
    devices: &[DeviceSnapshot],
) -> FilterStatus {
    match first_failed_predicate(req, devices) {
        None => FilterStatus::Fit,
        Some(_) => FilterStatus::unschedulable(node_name),
    }
}
