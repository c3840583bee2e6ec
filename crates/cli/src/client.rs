//! API client for communicating with the Benchmark Agent

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// API client for the Benchmark Agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid agent URL")?;
        // Keep any path prefix when joining relative paths
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .context("Invalid path")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Envelope> {
        let response = request.send().await.context("Failed to send request")?;
        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;

        match serde_json::from_str::<Envelope>(&body) {
            Ok(envelope) if status.is_success() && !envelope.error => Ok(envelope),
            Ok(envelope) => anyhow::bail!("API error ({}): {}", status, envelope.message()),
            Err(_) if status.is_success() => {
                anyhow::bail!("Unexpected response from agent: {}", body)
            }
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<Envelope> {
        self.send(self.client.get(self.url(path)?)).await
    }

    /// Make a POST request with JSON body
    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Envelope> {
        self.send(self.client.post(self.url(path)?).json(body)).await
    }

    /// Make a PUT request with JSON body
    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<Envelope> {
        self.send(self.client.put(self.url(path)?).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Envelope> {
        self.send(self.client.delete(self.url(path)?)).await
    }

    pub async fn create_benchmark(&self, spec: &Value) -> Result<Envelope> {
        self.post("benchmarks", spec).await
    }

    pub async fn list_benchmarks(&self) -> Result<BTreeMap<String, BenchmarkRecord>> {
        let envelope = self.get("benchmarks").await?;
        match envelope.data {
            Some(data) => serde_json::from_value(data).context("Failed to parse benchmark list"),
            None => Ok(BTreeMap::new()),
        }
    }

    pub async fn benchmark_status(&self, name: &str) -> Result<BenchmarkStatus> {
        let envelope = self.get(&format!("benchmarks/{}", name)).await?;
        match envelope.data {
            // The agent answers a failed deployment with its reason
            Some(Value::String(reason)) => Ok(BenchmarkStatus::Failed(reason)),
            Some(data) => serde_json::from_value(data)
                .map(BenchmarkStatus::Record)
                .context("Failed to parse benchmark record"),
            None => anyhow::bail!("Agent returned no record for {}", name),
        }
    }

    pub async fn update_intensity(&self, name: &str, intensity: u32) -> Result<Envelope> {
        self.put(
            &format!("benchmarks/{}/intensity", name),
            &IntensityRequest { intensity },
        )
        .await
    }

    pub async fn delete_benchmark(&self, name: &str) -> Result<Envelope> {
        self.delete(&format!("benchmarks/{}", name)).await
    }

    pub async fn delete_all(&self) -> Result<Envelope> {
        self.delete("benchmarks").await
    }
}

// API response types

/// Envelope wrapping every agent response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Envelope {
    /// Human-readable form of `data`
    pub fn message(&self) -> String {
        match &self.data {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Object(fields)) if fields.get("message").is_some_and(Value::is_string) => {
                fields["message"].as_str().unwrap_or_default().to_string()
            }
            Some(other) => other.to_string(),
            None => "no details".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSummary {
    pub image: String,
    #[serde(default)]
    pub count: i32,
    pub intensity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRecord {
    pub name: String,
    pub benchmark: BenchmarkSummary,
    #[serde(default)]
    pub name_to_id: BTreeMap<String, String>,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// What the agent knows about one benchmark
#[derive(Debug, Clone)]
pub enum BenchmarkStatus {
    Record(BenchmarkRecord),
    /// Deployment failed; the agent forgets the benchmark after reporting it
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntensityRequest {
    pub intensity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_json(name: &str, state: &str) -> Value {
        json!({
            "name": name,
            "benchmark": {"name": name, "image": "bench/stress:v2", "count": 2, "intensity": 50},
            "nameToId": {format!("{}1", name): "abc", format!("{}2", name): "def"},
            "state": state,
            "createdAt": 1_700_000_000,
            "updatedAt": 1_700_000_010
        })
    }

    #[tokio::test]
    async fn test_list_benchmarks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/benchmarks")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"error": false, "data": {"cpu-burn": record_json("cpu-burn", "DEPLOYED")}}).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let records = client.list_benchmarks().await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records["cpu-burn"].name_to_id.len(), 2);
        assert_eq!(records["cpu-burn"].benchmark.intensity, 50);
    }

    #[tokio::test]
    async fn test_status_distinguishes_failed_deployments() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/benchmarks/ok")
            .with_status(200)
            .with_body(json!({"error": false, "status": "DEPLOYED", "data": record_json("ok", "DEPLOYED")}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/benchmarks/bad")
            .with_status(202)
            .with_body(r#"{"error":false,"data":"Deployment of benchmark bad failed: boom"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        match client.benchmark_status("ok").await.unwrap() {
            BenchmarkStatus::Record(record) => assert_eq!(record.state, "DEPLOYED"),
            other => panic!("unexpected status {:?}", other),
        }
        match client.benchmark_status("bad").await.unwrap() {
            BenchmarkStatus::Failed(reason) => assert!(reason.ends_with("boom")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/benchmarks")
            .with_status(400)
            .with_body(r#"{"error":true,"data":"Benchmark a already created. Please delete it before re-creating"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .create_benchmark(&json!({"name": "a"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already created"));
    }

    #[tokio::test]
    async fn test_update_intensity_sends_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/benchmarks/cpu-burn/intensity")
            .match_body(mockito::Matcher::Json(json!({"intensity": 80})))
            .with_status(202)
            .with_body(r#"{"error":false}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        client.update_intensity("cpu-burn", 80).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_base_url_path_prefix_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/agent/benchmarks")
            .with_status(202)
            .with_body(r#"{"error":false}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/agent", server.url())).unwrap();
        client.delete_all().await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_envelope_message() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"error":true,"data":{"message":"left behind","failed":[]}}"#)
                .unwrap();
        assert_eq!(envelope.message(), "left behind");

        let envelope: Envelope = serde_json::from_str(r#"{"error":true}"#).unwrap();
        assert_eq!(envelope.message(), "no details");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
