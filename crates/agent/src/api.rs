//! HTTP API for benchmark lifecycle, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use bench_agent_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    models::{BenchmarkSpec, DeploymentState, UpdateRequest},
    orchestrator::{CreateOutcome, DeleteOutcome, Orchestrator},
    OrchestratorError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, orchestrator: Orchestrator) -> Self {
        Self {
            health_registry,
            orchestrator,
        }
    }

    /// Degrade the orchestrator component while teardowns leave containers behind
    async fn record_teardown(&self, residual: usize) {
        if residual == 0 {
            self.health_registry.set_healthy(components::ORCHESTRATOR).await;
        } else {
            self.health_registry
                .set_degraded(
                    components::ORCHESTRATOR,
                    format!("{} container(s) could not be removed", residual),
                )
                .await;
        }
    }
}

/// Envelope of every benchmark endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentState>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            error: false,
            data: None,
            status: None,
        }
    }

    pub fn data(data: impl Into<Value>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::ok()
        }
    }

    pub fn failure(data: impl Into<Value>) -> Self {
        Self {
            error: true,
            data: Some(data.into()),
            status: None,
        }
    }

    fn reply(self, code: StatusCode) -> Response {
        (code, Json(self)).into_response()
    }
}

/// Orchestrator error rendered as an envelope
struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrchestratorError::Discovery(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OrchestratorError::Validation(_)
            | OrchestratorError::Duplicate { .. }
            | OrchestratorError::NotDeployed { .. }
            | OrchestratorError::Deploy { .. }
            | OrchestratorError::Update { .. } => StatusCode::BAD_REQUEST,
        };
        ApiResponse::failure(self.0.to_string()).reply(code)
    }
}

fn bad_body(rejection: JsonRejection) -> Response {
    warn!(error = %rejection.body_text(), "Rejected request body");
    ApiResponse::failure(rejection.body_text()).reply(StatusCode::BAD_REQUEST)
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// POST /benchmarks
async fn create_benchmark(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BenchmarkSpec>, JsonRejection>,
) -> Response {
    let Json(spec) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    let name = spec.name.clone();
    match state.orchestrator.create(spec).await {
        Ok(CreateOutcome::Deployed) => {
            ApiResponse::data(format!("Benchmark {} deployed", name)).reply(StatusCode::ACCEPTED)
        }
        Ok(CreateOutcome::Accepted) => {
            ApiResponse::data(format!("Benchmark {} accepted", name)).reply(StatusCode::ACCEPTED)
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// GET /benchmarks
async fn list_benchmarks(State(state): State<Arc<AppState>>) -> Response {
    let records = state.orchestrator.list().await;
    ApiResponse::data(to_value(&records)).reply(StatusCode::OK)
}

/// GET /benchmarks/:name
async fn get_benchmark(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    let Some(record) = state.orchestrator.status(&name).await else {
        return ApiError(OrchestratorError::NotFound { name }).into_response();
    };

    if record.state == DeploymentState::Failed {
        let reason = record.error.as_deref().unwrap_or("unknown error");
        return ApiResponse::data(format!(
            "Deployment of benchmark {} failed: {}",
            name, reason
        ))
        .reply(StatusCode::ACCEPTED);
    }

    ApiResponse {
        error: false,
        data: Some(to_value(&record)),
        status: Some(record.state),
    }
    .reply(StatusCode::OK)
}

/// DELETE /benchmarks/:name
async fn delete_benchmark(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let response = match state.orchestrator.delete(&name).await? {
        DeleteOutcome::Discarded => ApiResponse::ok().reply(StatusCode::ACCEPTED),
        DeleteOutcome::TornDown(report) if report.is_complete() => {
            state.record_teardown(0).await;
            ApiResponse::data(to_value(&report)).reply(StatusCode::ACCEPTED)
        }
        DeleteOutcome::TornDown(report) => {
            state.record_teardown(report.failed.len()).await;
            error!(benchmark = %name, failed = report.failed.len(), "Benchmark left containers behind");
            ApiResponse::failure(json!({
                "message": format!("Unable to remove all containers of benchmark {}", name),
                "failed": report.failed,
            }))
            .reply(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    Ok(response)
}

/// DELETE /benchmarks
async fn delete_all_benchmarks(State(state): State<Arc<AppState>>) -> Response {
    let bulk = state.orchestrator.delete_all().await;
    state
        .record_teardown(bulk.residual.values().map(Vec::len).sum())
        .await;
    if bulk.is_complete() {
        return ApiResponse::data(to_value(&bulk)).reply(StatusCode::ACCEPTED);
    }

    ApiResponse::failure(json!({
        "message": "Unable to remove all benchmark containers",
        "removed": bulk.removed,
        "residual": bulk.residual,
    }))
    .reply(StatusCode::INTERNAL_SERVER_ERROR)
}

/// PUT /benchmarks/:name/intensity
async fn update_intensity(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    // Existence and state are reported before the body
    state.orchestrator.require_deployed(&name).await?;
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return Ok(bad_body(rejection)),
    };

    state
        .orchestrator
        .update_intensity(&name, request.intensity)
        .await?;
    Ok(ApiResponse::ok().reply(StatusCode::ACCEPTED))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once bootstrap is done, 503 before
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/benchmarks",
            get(list_benchmarks)
                .post(create_benchmark)
                .delete(delete_all_benchmarks),
        )
        .route(
            "/benchmarks/:name",
            get(get_benchmark).delete(delete_benchmark),
        )
        .route("/benchmarks/:name/intensity", put(update_intensity))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server, returning once `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
