//! Configuration validation
//!
//! Ensures settings are usable before the proxy starts. Ports and thread
//! counts are already constrained by their types.

use anyhow::Result;

use super::types::{Config, PoolConfig};
use crate::pool::Subnet;
use crate::types::HostName;

impl Config {
    /// Validate configuration for correctness
    ///
    /// Checks:
    /// - listen host is not empty
    /// - handshake timeout is non-zero
    /// - every subnet parses
    ///
    /// # Errors
    /// Returns the first failing check.
    pub fn validate(&self) -> Result<()> {
        HostName::new(self.proxy.host.as_str())?;

        if self.proxy.handshake_timeout.is_zero() {
            return Err(anyhow::anyhow!("handshake_timeout must be at least 1 second"));
        }

        self.pool.validate()
    }
}

impl PoolConfig {
    /// Check that every configured subnet parses
    ///
    /// An empty subnet list is valid; the proxy then uses the default egress.
    /// Every parsed subnet holds at least one address, so a non-empty list
    /// always yields a usable pool.
    ///
    /// # Errors
    /// Returns [`PoolError::InvalidSubnet`](crate::pool::PoolError::InvalidSubnet)
    /// for the first malformed entry.
    pub fn validate(&self) -> Result<()> {
        for subnet in &self.subnets {
            subnet.parse::<Subnet>()?;
        }
        Ok(())
    }
}
