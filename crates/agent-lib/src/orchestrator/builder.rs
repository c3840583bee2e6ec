//! Orchestrator configuration and builder

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::Orchestrator;
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::registry::BenchmarkRegistry;
use crate::runtime::ContainerRuntime;

/// How `create` waits for the deploy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployMode {
    /// Return only once the deploy reached a terminal state
    #[serde(rename = "sync")]
    Sync,
    /// Spawn the deploy and return immediately
    #[default]
    #[serde(rename = "async", alias = "background")]
    Background,
}

/// Tunables for the lifecycle orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on every runtime call except image pulls (default: 60 seconds)
    pub runtime_timeout: Duration,
    /// Bound on a single image pull (default: 10 minutes)
    pub pull_timeout: Duration,
    pub deploy_mode: DeployMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            runtime_timeout: Duration::from_secs(60),
            pull_timeout: Duration::from_secs(600),
            deploy_mode: DeployMode::default(),
        }
    }
}

/// Builder for the [`Orchestrator`]
pub struct OrchestratorBuilder {
    runtime: Option<Arc<dyn ContainerRuntime>>,
    registry: Option<BenchmarkRegistry>,
    config: OrchestratorConfig,
    metrics: Option<AgentMetrics>,
    node_name: String,
}

impl OrchestratorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            runtime: None,
            registry: None,
            config: OrchestratorConfig::default(),
            metrics: None,
            node_name: "unknown".to_string(),
        }
    }

    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Share an existing registry instead of starting empty
    pub fn registry(mut self, registry: BenchmarkRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn deploy_mode(mut self, mode: DeployMode) -> Self {
        self.config.deploy_mode = mode;
        self
    }

    pub fn runtime_timeout(mut self, timeout: Duration) -> Self {
        self.config.runtime_timeout = timeout;
        self
    }

    pub fn pull_timeout(mut self, timeout: Duration) -> Self {
        self.config.pull_timeout = timeout;
        self
    }

    pub fn metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Node name attached to lifecycle log events
    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let runtime = self
            .runtime
            .ok_or_else(|| anyhow::anyhow!("Container runtime is required"))?;
        if self.config.runtime_timeout.is_zero() || self.config.pull_timeout.is_zero() {
            anyhow::bail!("Runtime timeouts must be greater than zero");
        }

        Ok(Orchestrator::new(
            runtime,
            self.registry.unwrap_or_default(),
            self.config,
            self.metrics.unwrap_or_default(),
            StructuredLogger::new(self.node_name),
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
