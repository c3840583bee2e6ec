//! Health check infrastructure for the benchmark agent
//!
//! Tracks component health for the liveness and readiness probes. The
//! container runtime is the one component whose loss makes the agent
//! useless, so it is probed on an interval.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::runtime::ContainerRuntime;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving requests, with reduced guarantees
    Degraded,
    Unhealthy,
}

/// Last known health of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status among `components`, healthy when there are none
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const RUNTIME: &str = "runtime";
    pub const ORCHESTRATOR: &str = "orchestrator";
}

/// Shared component health map plus the startup-complete flag
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Flip once startup (runtime ping, orphan sweep) has finished
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let reason = if !*self.ready.read().await {
            Some("Agent startup not complete".to_string())
        } else if self.health().await.status == ComponentStatus::Unhealthy {
            Some("Container runtime unreachable".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

/// Ping the runtime once and record the outcome under [`components::RUNTIME`]
pub async fn probe_runtime(runtime: &dyn ContainerRuntime, registry: &HealthRegistry) -> bool {
    match runtime.ping().await {
        Ok(()) => {
            debug!("Container runtime reachable");
            registry.set_healthy(components::RUNTIME).await;
            true
        }
        Err(e) => {
            warn!(error = %e, "Container runtime probe failed");
            registry
                .set_unhealthy(components::RUNTIME, e.to_string())
                .await;
            false
        }
    }
}

/// Probe the runtime every `interval` until `shutdown` fires
pub async fn run_runtime_probe(
    runtime: Arc<dyn ContainerRuntime>,
    registry: HealthRegistry,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                probe_runtime(runtime.as_ref(), &registry).await;
            }
            _ = shutdown.recv() => {
                debug!("Runtime probe stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeRuntime;

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_worst_component_wins() {
        let registry = HealthRegistry::new();
        registry.register(components::RUNTIME).await;
        registry.register(components::ORCHESTRATOR).await;

        registry
            .set_degraded(components::ORCHESTRATOR, "Teardown left residual containers")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_unhealthy(components::RUNTIME, "Docker socket refused connection")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_readiness_requires_startup() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());

        registry.set_ready(true).await;
        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
    }

    #[tokio::test]
    async fn test_readiness_drops_when_runtime_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register(components::RUNTIME).await;
        registry.set_ready(true).await;
        registry.set_unhealthy(components::RUNTIME, "Failed").await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
    }

    #[tokio::test]
    async fn test_probe_runtime_tracks_reachability() {
        let registry = HealthRegistry::new();
        registry.register(components::RUNTIME).await;
        let runtime = FakeRuntime::new();

        assert!(probe_runtime(&runtime, &registry).await);
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        runtime.set_reachable(false);
        assert!(!probe_runtime(&runtime, &registry).await);
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(health.components[components::RUNTIME].message.is_some());

        runtime.set_reachable(true);
        assert!(probe_runtime(&runtime, &registry).await);
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_runtime_probe_stops_on_shutdown() {
        let registry = HealthRegistry::new();
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(FakeRuntime::new());
        let (tx, rx) = tokio::sync::broadcast::channel(1);

        let handle = tokio::spawn(run_runtime_probe(
            runtime,
            registry.clone(),
            Duration::from_millis(5),
            rx,
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        let health = registry.health().await;
        assert!(health.components.contains_key(components::RUNTIME));
    }
}
