//! Docker Engine adapter built on bollard

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    UpdateContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::TryStreamExt;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{ContainerRuntime, RemoveOptions};
use crate::error::RuntimeError;
use crate::planner::{ContainerPlan, CpuLimits, ImageRef};

/// Seconds bollard waits on a single request to the daemon
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Container runtime backed by a Docker daemon
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to `host` (`unix://`, `tcp://` or `http://`), or to the local
    /// defaults (`DOCKER_HOST`, then the platform socket) when `None`
    pub fn connect(host: Option<&str>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let target = host.unwrap_or("local defaults");
        let docker = match host {
            Some(addr) if addr.starts_with("unix://") => Docker::connect_with_unix(
                addr.trim_start_matches("unix://"),
                CLIENT_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            Some(addr) => {
                Docker::connect_with_http(addr, CLIENT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .with_context(|| format!("Failed to connect to Docker at {}", target))?;

        info!(host = %target, "Docker client configured");
        Ok(Self { docker })
    }
}

/// Map a bollard error, keeping 404s distinguishable
fn map_err(operation: &'static str, id: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound { id: id.to_string() },
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api {
            operation,
            reason: format!("{} (status {})", message, status_code),
        },
        other => RuntimeError::api(operation, other),
    }
}

fn host_config(plan: &ContainerPlan) -> HostConfig {
    HostConfig {
        publish_all_ports: Some(plan.publish_all_ports),
        auto_remove: Some(plan.auto_remove),
        network_mode: plan.host_network.then(|| "host".to_string()),
        cpu_period: plan.cpu_limits.map(|l| l.period),
        cpu_quota: plan.cpu_limits.map(|l| l.quota),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))
    }

    async fn pull_image(&self, image: &ImageRef) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: image.repo.as_str(),
            tag: image.tag.as_str(),
            ..Default::default()
        };

        let reference = image.to_string();
        let progress: Vec<_> = self
            .docker
            .create_image(Some(options), None, None)
            .try_collect()
            .await
            .map_err(|e| map_err("pull image", &reference, e))?;

        debug!(image = %reference, events = progress.len(), "Image pulled");
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        plan: &ContainerPlan,
    ) -> Result<String, RuntimeError> {
        let config = Config {
            image: Some(plan.image.to_string()),
            cmd: (!plan.command.is_empty()).then(|| plan.command.clone()),
            labels: Some(plan.labels.clone().into_iter().collect::<HashMap<_, _>>()),
            host_config: Some(host_config(plan)),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| map_err("create container", name, e))?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| map_err("start container", id, e))
    }

    async fn update_container(&self, id: &str, limits: CpuLimits) -> Result<(), RuntimeError> {
        let options = UpdateContainerOptions::<String> {
            cpu_period: Some(limits.period),
            cpu_quota: Some(limits.quota),
            ..Default::default()
        };

        self.docker
            .update_container(id, options)
            .await
            .map_err(|e| map_err("update container", id, e))
    }

    async fn remove_container(
        &self,
        id: &str,
        options: RemoveOptions,
    ) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: options.force,
            v: options.remove_volumes,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_err("remove container", id, e))
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<String>, RuntimeError> {
        let filters = HashMap::from([("label".to_string(), vec![label.to_string()])]);
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_err("list containers", label, e))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}
