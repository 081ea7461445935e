// Command Line Interface Module
// Subcommands for the aggregator server and the reporting agent

use crate::config::{AgentConfig, MetricsdConfig, ServerConfig};
use clap::{Args, Parser, Subcommand};
use colored::*;

/// metricsd - runtime metrics agent and aggregation server
#[derive(Parser)]
#[command(name = "metricsd")]
#[command(author = "Metricsd Team")]
#[command(version)]
#[command(about = "Runtime metrics collector agent and in-memory aggregation server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the aggregation server
    Server(ServerArgs),

    /// Run the reporting agent
    Agent(AgentArgs),

    /// Validate a configuration file and print the effective settings
    Validate {
        /// Configuration file to validate
        #[arg(short, long, default_value = "metricsd.toml")]
        file: String,
    },
}

/// Flags shared by every long-running subcommand
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "metricsd.toml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// HTTP server endpoint address
    #[arg(short = 'a', long)]
    pub address: Option<String>,

    /// Store interval in seconds (0 saves after every update)
    #[arg(short = 'i', long)]
    pub store_interval: Option<u64>,

    /// Snapshot file path
    #[arg(short = 'f', long)]
    pub file_storage_path: Option<String>,

    /// Restore the snapshot on startup (true/false, 1/0, t/f)
    #[arg(short = 'r', long, value_parser = crate::config::parse_bool)]
    pub restore: Option<bool>,
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Aggregator endpoint address
    #[arg(short = 'a', long)]
    pub address: Option<String>,

    /// Poll interval in seconds
    #[arg(short = 'p', long)]
    pub poll_interval: Option<u64>,

    /// Report interval in seconds
    #[arg(short = 'r', long)]
    pub report_interval: Option<u64>,

    /// Per-attempt request timeout in milliseconds
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,
}

impl ServerArgs {
    /// Layer flags over a file-provided config
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(secs) = self.store_interval {
            config.store_interval_secs = secs;
        }
        if let Some(path) = &self.file_storage_path {
            config.file_storage_path = path.clone();
        }
        if let Some(restore) = self.restore {
            config.restore = restore;
        }
    }
}

impl AgentArgs {
    /// Layer flags over a file-provided config
    pub fn apply(&self, config: &mut AgentConfig) {
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        if let Some(secs) = self.report_interval {
            config.report_interval_secs = secs;
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout_ms = ms;
        }
    }
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print the effective configuration as TOML
pub fn print_config(config: &MetricsdConfig) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config)?;
    println!("{}", rendered.bright_white());
    Ok(())
}
