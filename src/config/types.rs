//! Configuration type definitions
//!
//! This module contains all the core configuration structures used by the proxy.

use crate::types::{Port, ThreadCount, duration_serde};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Strategy for picking a client's egress address
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    /// Hash the client address: a client keeps the same egress address across reconnects
    #[default]
    Hash,
    /// Pick uniformly at random for every connection
    Random,
}

impl SelectionStrategy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Random => "random",
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SelectionStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "random" => Ok(Self::Random),
            other => Err(anyhow::anyhow!(
                "Invalid strategy '{}': must be 'hash' or 'random'",
                other
            )),
        }
    }
}

/// Main proxy configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Egress address pool
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Host/IP to bind to (default: 0.0.0.0)
    pub host: String,
    /// Port to listen on (default: 1080)
    pub port: Port,
    /// Number of worker threads (default: 1, use 0 for CPU cores)
    pub threads: ThreadCount,
    /// Accept an optional PROXY protocol header before the SOCKS5 greeting
    pub proxy_protocol: bool,
    /// Time allowed for the PROXY header and SOCKS5 handshake
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,
}

impl ProxyConfig {
    /// Default listen host (all interfaces)
    pub const DEFAULT_HOST: &'static str = crate::constants::listen::DEFAULT_HOST;

    /// Formatted listen address, e.g. `0.0.0.0:1080`
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port.get())
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_string(),
            port: Port::default(),
            threads: ThreadCount::default(),
            proxy_protocol: false,
            handshake_timeout: super::defaults::handshake_timeout(),
        }
    }
}

/// Egress address pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PoolConfig {
    /// Subnets (CIDR) or single addresses to egress from, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<String>,
    /// How a client's egress address is chosen
    pub strategy: SelectionStrategy,
}

impl PoolConfig {
    /// True if any subnet is configured
    ///
    /// Without subnets the proxy dials with the default outbound address.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.subnets.is_empty()
    }
}
