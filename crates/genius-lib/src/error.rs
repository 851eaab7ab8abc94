//! Error types for telemetry collection and scheduling cycles

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the telemetry backend.
///
/// Every variant aborts the current cycle; a partial cluster view is never
/// handed to filtering or scoring.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid telemetry endpoint {0}")]
    InvalidEndpoint(String),

    #[error("telemetry backend unreachable: {0}")]
    Transport(String),

    #[error("telemetry {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("telemetry backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("telemetry backend reported {error_type}: {message}")]
    Backend { error_type: String, message: String },

    #[error("failed to decode telemetry response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TelemetryError::Decode(err.to_string())
        } else {
            TelemetryError::Transport(err.to_string())
        }
    }
}

/// A single best-effort parse miss on one telemetry record.
///
/// These are recorded and counted, never propagated out of collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not extract {field} from telemetry record {record:?}")]
pub struct ParseFailure {
    pub field: &'static str,
    pub record: String,
}

/// Errors surfaced to the host for one scheduling cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("collecting cluster metrics failed: {0}")]
    Collection(#[from] TelemetryError),

    #[error("scoring task for node {node} did not complete: {reason}")]
    Task { node: String, reason: String },
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
pub type CycleResult<T> = Result<T, CycleError>;
