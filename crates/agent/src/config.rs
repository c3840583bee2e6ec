//! Agent configuration

use anyhow::{Context, Result};
use bench_agent_lib::orchestrator::{DeployMode, OrchestratorConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name attached to lifecycle events
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Port of the benchmark API, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Docker daemon address; local defaults when unset
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Use the in-memory runtime instead of Docker
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub deploy_mode: DeployMode,

    #[serde(default = "default_runtime_timeout")]
    pub runtime_timeout_secs: u64,

    #[serde(default = "default_pull_timeout")]
    pub pull_timeout_secs: u64,

    /// Remove marker-labelled containers left by an earlier run
    #[serde(default = "default_true")]
    pub purge_orphans_on_startup: bool,

    /// Tear every benchmark down before exiting
    #[serde(default)]
    pub teardown_on_shutdown: bool,

    #[serde(default = "default_health_probe_interval")]
    pub health_probe_interval_secs: u64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    7778
}

fn default_runtime_timeout() -> u64 {
    60
}

fn default_pull_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_health_probe_interval() -> u64 {
    30
}

impl AgentConfig {
    /// Load configuration from an optional file, then `AGENT_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("AGENT").try_parsing(true))
            .build()
            .context("Failed to read agent configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            runtime_timeout: Duration::from_secs(self.runtime_timeout_secs),
            pull_timeout: Duration::from_secs(self.pull_timeout_secs),
            deploy_mode: self.deploy_mode,
        }
    }

    pub fn health_probe_interval(&self) -> Duration {
        Duration::from_secs(self.health_probe_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let config = AgentConfig::load(None).unwrap();
        assert_eq!(config.api_port, 7778);
        assert_eq!(config.deploy_mode, DeployMode::Background);
        assert!(config.purge_orphans_on_startup);
        assert!(!config.teardown_on_shutdown);

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.runtime_timeout, Duration::from_secs(60));
        assert_eq!(orchestrator.pull_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
node_name = "bench-node-7"
api_port = 9000
dry_run = true
deploy_mode = "sync"
docker_host = "unix:///run/docker.sock"
pull_timeout_secs = 30
"#
        )
        .unwrap();

        let config = AgentConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.node_name, "bench-node-7");
        assert_eq!(config.api_port, 9000);
        assert!(config.dry_run);
        assert_eq!(config.deploy_mode, DeployMode::Sync);
        assert_eq!(config.docker_host.as_deref(), Some("unix:///run/docker.sock"));
        assert_eq!(config.orchestrator_config().pull_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = AgentConfig::load(Some(Path::new("/nonexistent/agent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_deploy_mode_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"deploy_mode": "eventually"}}"#).unwrap();

        assert!(AgentConfig::load(Some(file.path())).is_err());
    }
}
