//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Used when neither the flag, the environment nor the config file names an agent
pub const DEFAULT_AGENT_URL: &str = "http://localhost:7778";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent endpoint URL
    pub agent_url: Option<String>,
    /// Default output format
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from the default location; a missing file is not an error
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Agent URL after the flag/environment value `explicit`
    pub fn agent_url(&self, explicit: Option<String>) -> String {
        explicit
            .or_else(|| self.agent_url.clone())
            .unwrap_or_else(|| DEFAULT_AGENT_URL.to_string())
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("benchctl").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.agent_url.is_none());
        assert_eq!(config.agent_url(None), DEFAULT_AGENT_URL);
    }

    #[test]
    fn test_agent_url_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"agent_url": "http://bench-host:7778", "default_format": "json"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.default_format.as_deref(), Some("json"));
        assert_eq!(config.agent_url(None), "http://bench-host:7778");
        assert_eq!(
            config.agent_url(Some("http://other:1".to_string())),
            "http://other:1"
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{agent_url").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
