//! # Subnet Proxy Library
//!
//! A SOCKS5 proxy that originates each client's outbound connection from a
//! local address drawn out of configured subnets.
//!
//! ## Architecture
//!
//! - **pool**: weighted address pool over CIDR blocks, hash and random selection
//! - **router**: per-client egress plan (bound address or system default)
//! - **network**: family-constrained resolver and bound dialer
//! - **protocol**: SOCKS5 server side and PROXY protocol v1/v2 header parsing
//! - **proxy**: accept loop and per-client session lifecycle
//! - **config**: TOML configuration with environment overrides
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use subnet_proxy::{Config, SubnetProxy, bind_listener, shutdown_signal};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.pool.subnets = vec!["2001:db8::/64".to_string()];
//!
//! let proxy = Arc::new(SubnetProxy::new(&config)?);
//! let listener = bind_listener(&config.proxy).await?;
//! proxy.serve(listener, shutdown_signal()).await
//! # }
//! ```

pub mod args;
pub mod config;
pub mod connection_error;
pub mod constants;
pub mod formatting;
pub mod logging;
pub mod network;
pub mod pool;
pub mod protocol;
pub mod proxy;
pub mod router;
pub mod runtime;
pub mod types;

pub use args::Args;
pub use config::{
    Config, ConfigSource, PoolConfig, ProxyConfig, SelectionStrategy, create_default_config,
    load_config, load_config_with_fallback,
};
pub use connection_error::ConnectionError;
pub use logging::init_logging;
pub use pool::{AddressPool, PoolError};
pub use proxy::{SessionError, SessionSummary, SubnetProxy, SubnetProxyBuilder};
pub use router::{EgressPlan, EgressRouter};
pub use runtime::{RuntimeConfig, bind_listener, load_and_log_config, shutdown_signal};
