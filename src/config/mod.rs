//! Configuration module
//!
//! This module handles configuration types, loading and validation
//! for the SOCKS5 egress proxy.

mod defaults;
mod loading;
mod types;
mod validation;

pub use loading::{
    ConfigSource, ENV_STRATEGY, ENV_SUBNETS, create_default_config, load_config,
    load_config_with_fallback,
};
pub use types::{Config, PoolConfig, ProxyConfig, SelectionStrategy};

pub use defaults::handshake_timeout;
