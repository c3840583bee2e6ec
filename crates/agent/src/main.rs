//! Benchmark Agent - runs containerized benchmark workloads on this host
//!
//! Accepts benchmark specifications over HTTP, deploys them as Docker
//! containers and adjusts their intensity while they run.

use anyhow::{Context, Result};
use bench_agent_lib::{
    health::{components, run_runtime_probe, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    orchestrator::OrchestratorBuilder,
    runtime::{ContainerRuntime, DockerRuntime, FakeRuntime},
};
use benchmark_agent::{api, config::AgentConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "benchmark-agent", version, about = "Host agent for containerized benchmarks")]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API port, overrides the configured one
    #[arg(short, long)]
    port: Option<u16>,

    /// Keep containers in memory instead of talking to Docker
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = Args::parse();
    info!("Starting benchmark-agent");

    let mut config = AgentConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.api_port = port;
    }
    config.dry_run |= args.dry_run;
    info!(node_name = %config.node_name, deploy_mode = ?config.deploy_mode, "Agent configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::RUNTIME).await;
    health_registry.register(components::ORCHESTRATOR).await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let (runtime, runtime_kind): (Arc<dyn ContainerRuntime>, &str) = if config.dry_run {
        warn!("Dry run: containers are simulated in memory");
        (Arc::new(FakeRuntime::new()), "in-memory")
    } else {
        let docker = DockerRuntime::connect(config.docker_host.as_deref())?;
        (Arc::new(docker), "docker")
    };
    runtime
        .ping()
        .await
        .context("Container runtime unreachable")?;

    let orchestrator = OrchestratorBuilder::new()
        .runtime(runtime.clone())
        .config(config.orchestrator_config())
        .metrics(metrics)
        .node_name(config.node_name.clone())
        .build()?;

    if config.purge_orphans_on_startup {
        orchestrator
            .purge_orphans()
            .await
            .context("Failed to purge containers left by a previous run")?;
    }

    logger.log_startup(AGENT_VERSION, runtime_kind, config.api_port);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let probe = tokio::spawn(run_runtime_probe(
        runtime,
        health_registry.clone(),
        config.health_probe_interval(),
        shutdown_tx.subscribe(),
    ));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        orchestrator.clone(),
    ));

    // Bootstrap done, accept traffic
    health_registry.set_ready(true).await;

    let mut server_shutdown = shutdown_tx.subscribe();
    let mut server = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = server_shutdown.recv().await;
    }));

    let mut server_finished = false;
    let reason = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            "SIGINT received"
        }
        served = &mut server => {
            server_finished = true;
            served.context("API server task failed")??;
            "API server stopped"
        }
    };

    logger.log_shutdown(reason);
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    if config.teardown_on_shutdown {
        let bulk = orchestrator.delete_all().await;
        if !bulk.is_complete() {
            warn!(
                residual = bulk.residual.len(),
                "Benchmarks left running at shutdown"
            );
        }
    }

    if !server_finished {
        server.await.context("API server task failed")??;
    }
    let _ = probe.await;
    info!("Shutdown complete");

    Ok(())
}
