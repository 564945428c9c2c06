//! Tokio runtime configuration and startup utilities for the binary
//!
//! This module provides:
//! - Testable runtime configuration and builder logic
//! - Configuration loading with startup logging
//! - Listener binding and shutdown signal handling

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::args::Args;
use crate::config::{Config, ConfigSource, ProxyConfig};
use crate::types::ThreadCount;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    worker_threads: usize,
}

impl RuntimeConfig {
    /// Create runtime config from the configured thread count
    ///
    /// A single thread selects the current-thread runtime.
    #[must_use]
    pub fn from_threads(threads: ThreadCount) -> Self {
        Self {
            worker_threads: threads.get(),
        }
    }

    #[must_use]
    pub const fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    #[must_use]
    pub const fn is_single_threaded(&self) -> bool {
        self.worker_threads == 1
    }

    /// Build the tokio runtime
    ///
    /// # Errors
    /// Returns error if runtime creation fails
    pub fn build_runtime(self) -> Result<tokio::runtime::Runtime> {
        let rt = if self.is_single_threaded() {
            info!("Starting subnet proxy with single-threaded runtime");
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
        } else {
            info!(
                "Starting subnet proxy with {} worker threads",
                self.worker_threads
            );
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(self.worker_threads)
                .enable_all()
                .build()?
        };
        Ok(rt)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_threads(ThreadCount::default())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM on Unix)
///
/// If a handler cannot be installed that source is ignored and the other
/// one still triggers shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Load configuration for `args` and log the effective settings
///
/// # Errors
/// Returns error if configuration loading or validation fails
pub fn load_and_log_config(args: &Args) -> Result<(Config, ConfigSource)> {
    let (config, source) = args.resolve_config()?;

    info!("Loaded configuration from {}", source.as_str());
    info!(
        "CONFIG: listen={} threads={} proxy_protocol={} handshake_timeout={:?}",
        config.proxy.listen_addr(),
        config.proxy.threads,
        config.proxy.proxy_protocol,
        config.proxy.handshake_timeout
    );

    if config.pool.is_configured() {
        info!(
            "CONFIG: strategy={} subnets=[{}]",
            config.pool.strategy,
            config.pool.subnets.join(", ")
        );
    } else {
        warn!("No egress subnets configured, outbound connections use the default source address");
    }

    Ok((config, source))
}

/// Bind the SOCKS listener
///
/// # Errors
/// Returns error if binding fails
pub async fn bind_listener(proxy: &ProxyConfig) -> Result<TcpListener> {
    let listen_addr = proxy.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;

    info!("Subnet proxy listening on {}", listener.local_addr()?);
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Port;

    #[test]
    fn test_runtime_config_default_single_threaded() {
        let config = RuntimeConfig::default();
        assert_eq!(config.worker_threads(), 1);
        assert!(config.is_single_threaded());
    }

    #[test]
    fn test_runtime_config_multi_threaded() {
        let config = RuntimeConfig::from_threads(ThreadCount::new(4));
        assert_eq!(config.worker_threads(), 4);
        assert!(!config.is_single_threaded());
    }

    #[test]
    fn test_runtime_config_per_core() {
        let config = RuntimeConfig::from_threads(ThreadCount::new(0));
        assert_eq!(config.worker_threads(), ThreadCount::per_core().get());
    }

    #[test]
    fn test_build_runtime() {
        let rt = RuntimeConfig::from_threads(ThreadCount::new(2))
            .build_runtime()
            .unwrap();
        assert_eq!(rt.block_on(async { 7 }), 7);

        let rt = RuntimeConfig::default().build_runtime().unwrap();
        assert_eq!(rt.block_on(async { 1 + 1 }), 2);
    }

    #[tokio::test]
    async fn test_bind_listener_ephemeral() {
        // Port 0 is not a valid Port, so bind a known-free one first
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = free.local_addr().unwrap().port();
        drop(free);

        let proxy = ProxyConfig {
            host: "127.0.0.1".to_string(),
            port: Port::new(port).unwrap(),
            ..ProxyConfig::default()
        };

        let listener = bind_listener(&proxy).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_bind_listener_non_local_address() {
        let proxy = ProxyConfig {
            host: "192.0.2.1".to_string(),
            ..ProxyConfig::default()
        };

        let err = bind_listener(&proxy).await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind"));
    }
}
