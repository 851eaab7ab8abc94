//! GPU-aware node selection for a cluster scheduler
//!
//! This crate provides the core functionality for:
//! - Collecting per-device GPU telemetry into a cluster snapshot
//! - Filtering nodes against the GPU requirements of a workload
//! - Scoring and normalizing fit nodes against cluster aggregates
//! - Ordering pending workloads by priority
//! - Health checks and observability

pub mod aggregate;
pub mod collector;
pub mod cycle;
pub mod error;
pub mod filter;
pub mod health;
pub mod models;
pub mod normalize;
pub mod observability;
pub mod requirements;
pub mod score;
pub mod sort;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregate::ClusterAggregate;
pub use collector::ClusterCollector;
pub use cycle::{CycleReport, CycleState, GeniusPlugin, RankedNode, RejectedNode, SCHEDULER_NAME};
pub use error::{CycleError, ParseFailure, TelemetryError};
pub use filter::FilterStatus;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use normalize::{NodeScore, DEFAULT_MAX_SCORE};
pub use observability::{SchedulerMetrics, StructuredLogger};
pub use requirements::{RequestRequirements, WorkloadRequest};
pub use score::{RawScore, ScoreBreakdown, ScoringEngine, ScoringWeights};
pub use sort::QueuedRequest;
pub use telemetry::{PrometheusBackend, TelemetryBackend, TelemetryConfig};
