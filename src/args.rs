//! Command-line arguments for the `subnet-proxy` binary
//!
//! Flags override the config file. Listener flags also read `SUBNET_PROXY_*`
//! environment variables; pool overrides from the environment are applied by
//! the config loader.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, ConfigSource, SelectionStrategy, load_config_with_fallback};
use crate::types::{ConfigPath, Port, ThreadCount};

/// SOCKS5 proxy that originates each client's connections from an address
/// chosen out of configured subnets
#[derive(Parser, Debug, Clone)]
#[command(name = "subnet-proxy", version, about)]
pub struct Args {
    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "SUBNET_PROXY_PORT")]
    pub port: Option<Port>,

    /// Host to bind to (overrides config file)
    #[arg(long, env = "SUBNET_PROXY_HOST")]
    pub host: Option<String>,

    /// Egress subnet or address; repeat or comma-separate (replaces the config pool)
    #[arg(short, long = "subnet", value_delimiter = ',')]
    pub subnets: Vec<String>,

    /// Egress address selection strategy
    #[arg(long, value_enum)]
    pub strategy: Option<SelectionStrategy>,

    /// Accept a PROXY protocol (v1 or v2) header when a connection opens with one
    #[arg(long, env = "SUBNET_PROXY_PROXY_PROTOCOL")]
    pub proxy_protocol: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", env = "SUBNET_PROXY_CONFIG")]
    pub config: ConfigPath,

    /// Number of worker threads (default: 1, use 0 for CPU cores)
    #[arg(short, long, env = "SUBNET_PROXY_THREADS")]
    pub threads: Option<ThreadCount>,

    /// Also write logs to this file
    #[arg(long, env = "SUBNET_PROXY_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// Overlay command-line values onto a loaded configuration
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.proxy.port = port;
        }
        if let Some(host) = &self.host {
            config.proxy.host = host.clone();
        }
        if let Some(threads) = self.threads {
            config.proxy.threads = threads;
        }
        if self.proxy_protocol {
            config.proxy.proxy_protocol = true;
        }

        let subnets: Vec<String> = self
            .subnets
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !subnets.is_empty() {
            config.pool.subnets = subnets;
        }
        if let Some(strategy) = self.strategy {
            config.pool.strategy = strategy;
        }
    }

    /// Load the config file (or defaults), then apply these arguments and validate
    ///
    /// # Errors
    /// Fails on unreadable or invalid configuration, including a malformed subnet.
    pub fn resolve_config(&self) -> anyhow::Result<(Config, ConfigSource)> {
        let (mut config, source) = load_config_with_fallback(self.config.as_path())?;
        self.apply_to(&mut config);
        config.validate()?;
        Ok((config, source))
    }
}
