//! Benchmark lifecycle commands

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Read;
use std::time::{Duration, Instant};
use tabled::Tabled;

use crate::client::{ApiClient, BenchmarkRecord, BenchmarkStatus};
use crate::output::{
    color_state, format_age, print_error, print_info, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

/// Row for the benchmarks table
#[derive(Tabled)]
struct BenchmarkRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Intensity")]
    intensity: u32,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Age")]
    age: String,
}

impl From<&BenchmarkRecord> for BenchmarkRow {
    fn from(record: &BenchmarkRecord) -> Self {
        let wanted = record.benchmark.count.max(1);
        Self {
            name: record.name.clone(),
            image: record.benchmark.image.clone(),
            replicas: format!("{}/{}", record.name_to_id.len(), wanted),
            intensity: record.benchmark.intensity,
            state: color_state(&record.state),
            age: format_age(record.created_at),
        }
    }
}

/// Row for the per-replica table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// Read a benchmark spec from `source`, `-` meaning stdin
fn read_spec(source: &str) -> Result<Value> {
    let content = if source == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read spec from stdin")?;
        content
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read spec file {}", source))?
    };

    let spec: Value = serde_json::from_str(&content).context("Spec is not valid JSON")?;
    if !spec.get("name").is_some_and(Value::is_string) {
        anyhow::bail!("Spec must contain a string \"name\"");
    }
    Ok(spec)
}

pub async fn create(client: &ApiClient, source: &str, format: OutputFormat) -> Result<()> {
    let spec = read_spec(source)?;
    let envelope = client.create_benchmark(&spec).await?;

    match format {
        OutputFormat::Json => print_json(&envelope),
        OutputFormat::Table => print_success(&envelope.message()),
    }
    Ok(())
}

pub async fn list(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let records = client.list_benchmarks().await?;

    match format {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Table => {
            let rows: Vec<BenchmarkRow> = records.values().map(BenchmarkRow::from).collect();
            print_table(&rows);
        }
    }
    Ok(())
}

pub async fn status(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    match client.benchmark_status(name).await? {
        BenchmarkStatus::Record(record) => {
            match format {
                OutputFormat::Json => print_json(&record),
                OutputFormat::Table => {
                    print_table(&[BenchmarkRow::from(&record)]);
                    let containers: Vec<ContainerRow> = record
                        .name_to_id
                        .iter()
                        .map(|(container, id)| ContainerRow {
                            container: container.clone(),
                            id: short_id(id),
                        })
                        .collect();
                    if !containers.is_empty() {
                        print_table(&containers);
                    }
                }
            }
            Ok(())
        }
        BenchmarkStatus::Failed(reason) => {
            print_error(&reason);
            anyhow::bail!("Benchmark {} failed to deploy", name)
        }
    }
}

/// Poll until `name` is deployed, its deploy failed, or `timeout` passes
pub async fn wait(
    client: &ApiClient,
    name: &str,
    timeout: Duration,
    interval: Duration,
    format: OutputFormat,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut last_state = String::new();

    loop {
        match client.benchmark_status(name).await? {
            BenchmarkStatus::Record(record) if record.state == "DEPLOYED" => {
                match format {
                    OutputFormat::Json => print_json(&record),
                    OutputFormat::Table => print_success(&format!(
                        "Benchmark {} deployed with {} replica(s)",
                        name,
                        record.name_to_id.len()
                    )),
                }
                return Ok(());
            }
            BenchmarkStatus::Record(record) => {
                if record.state != last_state && format == OutputFormat::Table {
                    print_info(&format!("Benchmark {} is {}", name, color_state(&record.state)));
                }
                last_state = record.state;
            }
            BenchmarkStatus::Failed(reason) => {
                print_error(&reason);
                anyhow::bail!("Benchmark {} failed to deploy", name);
            }
        }

        if Instant::now() >= deadline {
            anyhow::bail!(
                "Timed out after {}s waiting for benchmark {}",
                timeout.as_secs(),
                name
            );
        }
        tokio::time::sleep(interval).await;
    }
}

pub async fn intensity(
    client: &ApiClient,
    name: &str,
    intensity: u32,
    format: OutputFormat,
) -> Result<()> {
    let envelope = client.update_intensity(name, intensity).await?;

    match format {
        OutputFormat::Json => print_json(&envelope),
        OutputFormat::Table => print_success(&format!(
            "Benchmark {} now runs at intensity {}",
            name, intensity
        )),
    }
    Ok(())
}

pub async fn delete(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let envelope = client.delete_benchmark(name).await?;

    match format {
        OutputFormat::Json => print_json(&envelope),
        OutputFormat::Table => print_success(&format!("Benchmark {} deleted", name)),
    }
    Ok(())
}

pub async fn delete_all(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let envelope = client.delete_all().await?;

    match format {
        OutputFormat::Json => print_json(&envelope),
        OutputFormat::Table => {
            let removed = envelope
                .data
                .as_ref()
                .and_then(|data| data.get("removed"))
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            if removed == 0 {
                print_warning("No benchmarks to delete");
            } else {
                print_success(&format!("Deleted {} benchmark(s)", removed));
            }
        }
    }
    Ok(())
}

/// First 12 characters, as `docker ps` shows ids
fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_spec_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "cpu-burn", "image": "busybox", "intensity": 5}}"#).unwrap();

        let spec = read_spec(file.path().to_str().unwrap()).unwrap();
        assert_eq!(spec["name"], "cpu-burn");
    }

    #[test]
    fn test_read_spec_requires_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"image": "busybox"}}"#).unwrap();
        assert!(read_spec(file.path().to_str().unwrap()).is_err());

        assert!(read_spec("/nonexistent/spec.json").is_err());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
