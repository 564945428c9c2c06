//! SOCKS5 egress proxy server
//!
//! This module contains the main `SubnetProxy` struct which owns the egress
//! router and runs the accept loop.
//!
//! ## Module structure
//!
//! - [`builder`]: Builder for constructing proxy instances from configuration
//! - [`lifecycle`]: Per-client session handling and logging

mod builder;
mod lifecycle;

pub use builder::SubnetProxyBuilder;
pub use lifecycle::{SessionError, SessionSummary};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::router::EgressRouter;

#[derive(Debug, Clone)]
pub struct SubnetProxy {
    /// Egress address selection, shared by all sessions
    pub(super) router: Arc<EgressRouter>,
    /// Expect a PROXY protocol header before the SOCKS5 greeting
    pub(super) proxy_protocol: bool,
    /// Bound on reading the PROXY header and on the SOCKS5 handshake
    pub(super) handshake_timeout: Duration,
    /// Number of sessions currently being served
    pub(super) active_clients: Arc<AtomicUsize>,
}

impl SubnetProxy {
    /// Create a proxy from configuration
    ///
    /// # Errors
    /// Fails if the configured egress pool is malformed or has no usable address.
    ///
    /// # Examples
    ///
    /// ```
    /// use subnet_proxy::{Config, SubnetProxy};
    ///
    /// let mut config = Config::default();
    /// config.pool.subnets = vec!["10.0.0.0/24".to_string()];
    ///
    /// let proxy = SubnetProxy::new(&config).unwrap();
    /// assert_eq!(proxy.router().pool().unwrap().total().to_string(), "253");
    /// ```
    pub fn new(config: &Config) -> Result<Self> {
        SubnetProxyBuilder::new(config).build()
    }

    /// Create a builder for more control over construction
    #[must_use]
    pub fn builder(config: &Config) -> SubnetProxyBuilder {
        SubnetProxyBuilder::new(config)
    }

    #[must_use]
    pub fn router(&self) -> &EgressRouter {
        &self.router
    }

    #[must_use]
    pub const fn proxy_protocol(&self) -> bool {
        self.proxy_protocol
    }

    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Number of sessions currently being served
    #[must_use]
    pub fn active_clients(&self) -> usize {
        self.active_clients.load(Ordering::Relaxed)
    }

    /// Accept clients on `listener` until `shutdown` completes
    ///
    /// Every connection is served on its own task. Accept errors are logged
    /// and the loop keeps going; in-flight sessions are not awaited on shutdown.
    ///
    /// # Errors
    /// Currently always returns `Ok` once shutdown is signalled.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown initiated, stopping accept loop");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let proxy = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = proxy.handle_client(stream).await {
                            lifecycle::log_session_error(addr, &e);
                        }
                    });
                }
            }
        }

        info!(
            "Proxy stopped with {} session(s) still open",
            self.active_clients()
        );
        Ok(())
    }
}
