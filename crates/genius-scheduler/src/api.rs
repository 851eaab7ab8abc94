//! HTTP API: scheduler extender endpoints, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use genius_lib::{
    cycle::{CycleReport, CycleState, GeniusPlugin},
    health::{components, ComponentStatus, HealthRegistry},
    sort::sort_requests,
    ClusterSnapshot, CycleError, WorkloadRequest,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub plugin: Arc<GeniusPlugin>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(plugin: GeniusPlugin, health_registry: HealthRegistry) -> Self {
        Self {
            plugin: Arc::new(plugin),
            health_registry,
        }
    }

    /// Fold the outcome of a cycle into component health
    async fn track<T>(&self, result: &Result<T, CycleError>) {
        match result {
            Ok(_) => {
                self.health_registry
                    .record_success(components::TELEMETRY)
                    .await
            }
            Err(CycleError::Collection(e)) => {
                let status = self
                    .health_registry
                    .record_failure(components::TELEMETRY, e.to_string())
                    .await;
                if status == ComponentStatus::Unhealthy {
                    warn!(error = %e, "Telemetry marked unhealthy after repeated failures");
                }
            }
            Err(e @ CycleError::Task { .. }) => {
                self.health_registry
                    .record_failure(components::EXTENDER, e.to_string())
                    .await;
            }
        }
    }

    async fn collect_state(&self) -> Result<Arc<CycleState>, CycleError> {
        let result = self.plugin.pre_filter().await;
        self.track(&result).await;
        result
    }
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<CycleError> for ApiError {
    fn from(err: CycleError) -> Self {
        let status = match err {
            CycleError::Collection(_) => StatusCode::SERVICE_UNAVAILABLE,
            CycleError::Task { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Pod as sent by the host, either flat or with Kubernetes `metadata`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PodSpec {
    Object { metadata: WorkloadRequest },
    Flat(WorkloadRequest),
}

impl PodSpec {
    pub fn into_request(self) -> WorkloadRequest {
        match self {
            PodSpec::Object { metadata } => metadata,
            PodSpec::Flat(request) => request,
        }
    }
}

/// Extender call body for filter and prioritize
#[derive(Debug, Clone, Deserialize)]
pub struct ExtenderArgs {
    pub pod: PodSpec,
    #[serde(alias = "nodenames", default)]
    pub node_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtenderFilterResult {
    pub node_names: Vec<String>,
    pub failed_nodes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPriority {
    pub host: String,
    pub score: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleRequest {
    pub request: WorkloadRequest,
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SortRequest {
    pub requests: Vec<WorkloadRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortResponse {
    pub names: Vec<String>,
}

/// Returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn snapshot(State(state): State<Arc<AppState>>) -> Result<Json<ClusterSnapshot>, ApiError> {
    let cycle = state.collect_state().await?;
    Ok(Json(cycle.snapshot().clone()))
}

async fn run_cycle(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CycleRequest>,
) -> Result<Json<CycleReport>, ApiError> {
    let result = state.plugin.run_cycle(&body.request, &body.nodes).await;
    state.track(&result).await;
    Ok(Json(result?))
}

async fn filter(
    State(state): State<Arc<AppState>>,
    Json(args): Json<ExtenderArgs>,
) -> (StatusCode, Json<ExtenderFilterResult>) {
    let request = args.pod.into_request();

    let report = match evaluate(&state, &request, &args.node_names).await {
        Ok(report) => report,
        Err(e) => {
            let status = e.status;
            return (
                status,
                Json(ExtenderFilterResult {
                    error: Some(e.message),
                    ..Default::default()
                }),
            );
        }
    };

    let mut node_names: Vec<String> = report.ranked.into_iter().map(|r| r.node_name).collect();
    node_names.sort();
    let failed_nodes = report
        .rejected
        .into_iter()
        .map(|r| (r.node_name, r.reason))
        .collect();

    (
        StatusCode::OK,
        Json(ExtenderFilterResult {
            node_names,
            failed_nodes,
            error: None,
        }),
    )
}

async fn prioritize(
    State(state): State<Arc<AppState>>,
    Json(args): Json<ExtenderArgs>,
) -> Result<Json<Vec<HostPriority>>, ApiError> {
    let request = args.pod.into_request();
    let report = evaluate(&state, &request, &args.node_names).await?;

    let priorities = report
        .ranked
        .into_iter()
        .map(|r| HostPriority {
            host: r.node_name,
            score: r.score,
        })
        .collect();
    Ok(Json(priorities))
}

async fn sort(Json(body): Json<SortRequest>) -> Json<SortResponse> {
    let names = sort_requests(&body.requests)
        .into_iter()
        .map(|q| q.name)
        .collect();
    Json(SortResponse { names })
}

async fn evaluate(
    state: &AppState,
    request: &WorkloadRequest,
    nodes: &[String],
) -> Result<CycleReport, ApiError> {
    let cycle = state.collect_state().await?;
    Ok(state.plugin.evaluate(cycle, request, nodes).await?)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/filter", post(filter))
        .route("/prioritize", post(prioritize))
        .route("/api/v1/snapshot", get(snapshot))
        .route("/api/v1/cycle", post(run_cycle))
        .route("/api/v1/sort", post(sort))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
