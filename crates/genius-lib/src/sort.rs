//! Queue ordering of pending workload requests

use crate::requirements::WorkloadRequest;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A request waiting in the scheduling queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub name: String,
    pub priority: i64,
    /// Position in the queue at enqueue time; breaks priority ties
    pub enqueue_seq: u64,
}

impl QueuedRequest {
    pub fn new(request: &WorkloadRequest, enqueue_seq: u64) -> Self {
        Self {
            name: request.name.clone(),
            priority: request.requirements().effective_priority(),
            enqueue_seq,
        }
    }
}

/// Higher priority first, then earlier enqueue
pub fn compare(a: &QueuedRequest, b: &QueuedRequest) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.enqueue_seq.cmp(&b.enqueue_seq))
}

/// Whether `a` should be scheduled before `b`
pub fn less(a: &QueuedRequest, b: &QueuedRequest) -> bool {
    compare(a, b) == Ordering::Less
}

/// Order requests for scheduling, taking list position as enqueue order
pub fn sort_requests(requests: &[WorkloadRequest]) -> Vec<QueuedRequest> {
    let mut queued: Vec<QueuedRequest> = requests
        .iter()
        .zip(0u64..)
        .map(|(r, seq)| QueuedRequest::new(r, seq))
        .collect();
    queued.sort_by(compare);
    queued
}
