use crate::utils::config_dir;
use anyhow::{anyhow, Context};
use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const API_URL_ENV: &str = "QCJOB_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Updates one setting by its command-line key.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "api-url" | "api_url" => {
                Url::parse(value).with_context(|| format!("Invalid API URL {value}"))?;
                self.api_url = value.trim_end_matches('/').to_string();
            }
            "poll-interval" | "poll_interval_secs" => {
                let secs: u64 = value.parse()?;
                if secs == 0 {
                    return Err(anyhow!("Poll interval must be at least one second"));
                }
                self.poll_interval_secs = secs;
            }
            "timeout" | "request_timeout_secs" => {
                let secs: u64 = value.parse()?;
                if secs == 0 {
                    return Err(anyhow!("Timeout must be at least one second"));
                }
                self.request_timeout_secs = secs;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown setting {key}, expected api-url, poll-interval or timeout"
                ))
            }
        }
        Ok(())
    }
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

pub fn read_config_from(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}

pub fn write_config_to(path: &Path, config: &Config) -> anyhow::Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(config)?)?;
    info!("Wrote config to {}", path.display());
    Ok(())
}

/// Reads the config file and applies the `--api-url` / `QCJOB_API_URL` override.
pub fn load_config(api_url: Option<String>) -> anyhow::Result<Config> {
    let mut config = read_config_from(&config_path()?)?;
    if let Some(url) = api_url {
        debug!("API URL overridden to {url}");
        config.set("api-url", &url)?;
    }
    Ok(config)
}
