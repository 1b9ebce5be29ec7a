//! Server configuration.
//!
//! Values come from three places, later ones winning:
//! 1. Built-in defaults
//! 2. A TOML file given with `--config`
//! 3. Command-line flags
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:6379"
//! max_connect = 1024
//! timeout = 300   # seconds, 0 disables the idle timeout
//! ```

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line arguments
#[derive(Parser, Debug, Default)]
#[command(name = "flashresp")]
#[command(version)]
#[command(about = "RESP echo server built on the FlashKV protocol core", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:6379)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Maximum number of concurrently served connections (0 = unlimited)
    #[arg(short, long)]
    pub max_connect: Option<u32>,

    /// Idle timeout per connection in seconds (0 = disabled)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Listener and connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address to listen on
    pub address: String,
    /// Cap on connections served at once; 0 means no cap
    pub max_connect: u32,
    /// Idle timeout; zero disables it
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: format!("{}:{}", crate::DEFAULT_HOST, crate::DEFAULT_PORT),
            max_connect: 0,
            timeout: Duration::ZERO,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
    address: Option<String>,
    max_connect: Option<u32>,
    /// Seconds
    timeout: Option<u64>,
}

impl Config {
    /// Builds the configuration from parsed command-line arguments,
    /// reading the config file they point at, if any.
    pub fn load(args: &CliArgs) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: FileConfig = toml::from_str(content)?;
        let mut config = Self::default();
        if let Some(address) = file.server.address {
            config.address = address;
        }
        if let Some(max_connect) = file.server.max_connect {
            config.max_connect = max_connect;
        }
        if let Some(timeout) = file.server.timeout {
            config.timeout = Duration::from_secs(timeout);
        }
        Ok(config)
    }

    fn apply_args(&mut self, args: &CliArgs) {
        if let Some(address) = &args.address {
            self.address = address.clone();
        }
        if let Some(max_connect) = args.max_connect {
            self.max_connect = max_connect;
        }
        if let Some(timeout) = args.timeout {
            self.timeout = Duration::from_secs(timeout);
        }
    }

    /// The idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}
