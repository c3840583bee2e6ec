//! Benchmark Agent CLI
//!
//! A command-line tool for creating, inspecting, tuning and deleting
//! benchmarks on a host running the benchmark agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::benchmarks;
use std::time::Duration;

/// Benchmark Agent CLI
#[derive(Parser)]
#[command(name = "benchctl")]
#[command(author, version, about = "CLI for the Benchmark Agent", long_about = None)]
pub struct Cli {
    /// Agent URL (can also be set via BENCH_AGENT_URL env var)
    #[arg(long, env = "BENCH_AGENT_URL")]
    pub agent_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and deploy a benchmark from a JSON spec
    Create {
        /// Spec file, or - to read stdin
        file: String,
    },

    /// List all benchmarks
    List,

    /// Show the status of one benchmark
    Status {
        /// Benchmark name
        name: String,
    },

    /// Wait until a benchmark is deployed
    Wait {
        /// Benchmark name
        name: String,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval: u64,
    },

    /// Change the intensity of a deployed benchmark
    Intensity {
        /// Benchmark name
        name: String,

        /// New intensity, 0-100
        #[arg(value_parser = clap::value_parser!(u32).range(0..=100))]
        value: u32,
    },

    /// Delete one benchmark, or all of them
    Delete {
        /// Benchmark name
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,

        /// Delete every benchmark on the agent
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();

    // Initialize client
    let client = client::ApiClient::new(&config.agent_url(cli.agent_url))?;

    // Execute command
    match cli.command {
        Commands::Create { file } => benchmarks::create(&client, &file, format).await?,
        Commands::List => benchmarks::list(&client, format).await?,
        Commands::Status { name } => benchmarks::status(&client, &name, format).await?,
        Commands::Wait {
            name,
            timeout,
            interval,
        } => {
            benchmarks::wait(
                &client,
                &name,
                Duration::from_secs(timeout),
                Duration::from_millis(interval.max(10)),
                format,
            )
            .await?
        }
        Commands::Intensity { name, value } => {
            benchmarks::intensity(&client, &name, value, format).await?
        }
        Commands::Delete { name: Some(name), .. } => {
            benchmarks::delete(&client, &name, format).await?
        }
        Commands::Delete { name: None, .. } => benchmarks::delete_all(&client, format).await?,
    }

    Ok(())
}
