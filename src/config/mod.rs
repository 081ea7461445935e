// Configuration Management Module
// Handles metricsd.toml loading, environment overrides, defaults, and validation

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use anyhow::{Result, Context};
use tracing::{info, warn};

/// Main metricsd configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsdConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

/// Aggregator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,

    /// Seconds between snapshots; 0 saves after every update
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,

    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,

    /// Seed the store from the snapshot file on startup
    #[serde(default = "default_true")]
    pub restore: bool,
}

/// Collector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Upper bound for a single delivery attempt
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Delays between delivery attempts, in order
    #[serde(default = "default_backoff_schedule")]
    pub backoff_schedule_ms: Vec<u64>,
}

// Default value functions
fn default_address() -> String { "localhost:8080".to_string() }
fn default_store_interval() -> u64 { 300 }
fn default_file_storage_path() -> String { "/tmp/metrics-db.json".to_string() }
fn default_poll_interval() -> u64 { 2 }
fn default_report_interval() -> u64 { 10 }
fn default_request_timeout() -> u64 { 5000 }
fn default_backoff_schedule() -> Vec<u64> { vec![100, 500, 1000] }
fn default_true() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: default_true(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            request_timeout_ms: default_request_timeout(),
            backoff_schedule_ms: default_backoff_schedule(),
        }
    }
}

impl ServerConfig {
    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    /// Apply `ADDRESS`, `STORE_INTERVAL`, `FILE_STORAGE_PATH` and `RESTORE`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = address_from_env(&lookup) {
            self.address = address;
        }
        if let Some(secs) = parse_env(&lookup, "STORE_INTERVAL") {
            self.store_interval_secs = secs;
        }
        if let Some(path) = lookup("FILE_STORAGE_PATH").filter(|v| !v.is_empty()) {
            self.file_storage_path = path;
        }
        if let Some(restore) = parse_env_with(&lookup, "RESTORE", parse_bool) {
            self.restore = restore;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            anyhow::bail!("Server address cannot be empty");
        }

        if self.file_storage_path.trim().is_empty() {
            anyhow::bail!("File storage path cannot be empty");
        }

        Ok(())
    }
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.backoff_schedule_ms.iter().copied().map(Duration::from_millis).collect()
    }

    /// Apply `ADDRESS`, `POLL_INTERVAL` and `REPORT_INTERVAL`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = address_from_env(&lookup) {
            self.address = address;
        }
        if let Some(secs) = parse_env(&lookup, "POLL_INTERVAL") {
            self.poll_interval_secs = secs;
        }
        if let Some(secs) = parse_env(&lookup, "REPORT_INTERVAL") {
            self.report_interval_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            anyhow::bail!("Agent address cannot be empty");
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("Poll interval must be at least 1 second");
        }

        if self.report_interval_secs == 0 {
            anyhow::bail!("Report interval must be at least 1 second");
        }

        if self.request_timeout_ms == 0 {
            anyhow::bail!("Request timeout cannot be 0");
        }

        if self.backoff_schedule_ms.is_empty() {
            anyhow::bail!("Backoff schedule needs at least one delay");
        }

        Ok(())
    }
}

/// `ADDRESS` wins; otherwise `SERVER_PORT` selects a localhost port
fn address_from_env<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(address) = lookup("ADDRESS").filter(|v| !v.is_empty()) {
        return Some(address);
    }
    lookup("SERVER_PORT")
        .filter(|v| !v.is_empty())
        .map(|port| format!("localhost:{}", port))
}

/// Parse a boolean the way operators write it: `1/t/true` or `0/f/false`
///
/// Accepts lower, upper and title case. Also serves as a clap value parser.
pub fn parse_bool(raw: &str) -> std::result::Result<bool, String> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(format!("invalid boolean '{}'", other)),
    }
}

/// Parse an environment value, ignoring it with a warning when invalid
fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    parse_env_with(lookup, key, |raw| raw.parse::<T>())
}

fn parse_env_with<F, T, E, P>(lookup: &F, key: &str, parse: P) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> std::result::Result<T, E>,
{
    let raw = lookup(key).filter(|v| !v.is_empty())?;
    match parse(&raw) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

/// Read a variable from the process environment
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl MetricsdConfig {
    /// Load configuration from file or use defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let contents = std::fs::read_to_string(path)
                .context("Failed to read configuration file")?;

            let config: MetricsdConfig = toml::from_str(&contents)
                .context("Failed to parse configuration file")?;

            Ok(config)
        } else {
            warn!("Configuration file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.agent.validate()?;
        Ok(())
    }
}
