//! Builder for constructing `SubnetProxy` instances

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{Config, SelectionStrategy};
use crate::pool::AddressPool;
use crate::router::EgressRouter;

use super::SubnetProxy;

/// Builder for constructing a `SubnetProxy` with optional overrides
///
/// # Examples
///
/// Sharing one pool between proxies:
/// ```
/// use std::sync::Arc;
/// use subnet_proxy::{Config, SubnetProxyBuilder};
/// use subnet_proxy::pool::AddressPool;
///
/// let pool = Arc::new(AddressPool::new(["10.0.0.1", "10.0.0.2"]).unwrap());
/// let proxy = SubnetProxyBuilder::new(&Config::default())
///     .with_pool(pool)
///     .build()
///     .unwrap();
///
/// assert_eq!(proxy.router().pool().unwrap().total().to_string(), "2");
/// ```
#[derive(Debug)]
pub struct SubnetProxyBuilder {
    subnets: Vec<String>,
    strategy: SelectionStrategy,
    proxy_protocol: bool,
    handshake_timeout: Duration,
    pool: Option<Arc<AddressPool>>,
}

impl SubnetProxyBuilder {
    /// Start from the pool and listener settings of `config`
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            subnets: config.pool.subnets.clone(),
            strategy: config.pool.strategy,
            proxy_protocol: config.proxy.proxy_protocol,
            handshake_timeout: config.proxy.handshake_timeout,
            pool: None,
        }
    }

    /// Use an already built pool instead of the configured subnets
    #[must_use]
    pub fn with_pool(mut self, pool: Arc<AddressPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_proxy_protocol(mut self, enabled: bool) -> Self {
        self.proxy_protocol = enabled;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Build the proxy
    ///
    /// # Errors
    /// Fails if a configured subnet is malformed or the pool has no usable address.
    pub fn build(self) -> Result<SubnetProxy> {
        let pool = match self.pool {
            Some(pool) => Some(pool),
            None if self.subnets.is_empty() => None,
            None => Some(Arc::new(
                AddressPool::new(&self.subnets).context("Failed to create IP pool")?,
            )),
        };

        match &pool {
            Some(pool) => info!(
                "Egress pool: {} subnet(s), {} usable address(es), {} strategy",
                pool.len(),
                pool.total(),
                self.strategy
            ),
            None => info!("No egress pool, using the default outbound address"),
        }

        if self.proxy_protocol {
            info!("Proxy protocol support is enabled");
        }

        Ok(SubnetProxy {
            router: Arc::new(EgressRouter::new(pool, self.strategy)),
            proxy_protocol: self.proxy_protocol,
            handshake_timeout: self.handshake_timeout,
            active_clients: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolError;

    #[test]
    fn test_build_without_pool() {
        let proxy = SubnetProxyBuilder::new(&Config::default()).build().unwrap();
        assert!(proxy.router().pool().is_none());
        assert!(!proxy.proxy_protocol());
        assert_eq!(proxy.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(proxy.active_clients(), 0);
    }

    #[test]
    fn test_build_from_config_subnets() {
        let mut config = Config::default();
        config.pool.subnets = vec!["10.0.0.0/24".to_string(), "10.0.1.0/24".to_string()];
        config.pool.strategy = SelectionStrategy::Random;
        config.proxy.proxy_protocol = true;

        let proxy = SubnetProxy::new(&config).unwrap();
        assert_eq!(proxy.router().pool().unwrap().total().to_string(), "506");
        assert_eq!(proxy.router().strategy(), SelectionStrategy::Random);
        assert!(proxy.proxy_protocol());
    }

    #[test]
    fn test_build_rejects_malformed_subnet() {
        let mut config = Config::default();
        config.pool.subnets = vec!["not-an-ip".to_string()];

        let err = SubnetProxy::new(&config).unwrap_err();
        assert!(err.to_string().contains("Failed to create IP pool"));
        assert_eq!(
            err.downcast_ref::<PoolError>(),
            Some(&PoolError::InvalidSubnet("not-an-ip".to_string()))
        );
    }

    #[test]
    fn test_builder_overrides() {
        let pool = Arc::new(AddressPool::new(["192.0.2.1"]).unwrap());
        let proxy = SubnetProxy::builder(&Config::default())
            .with_pool(Arc::clone(&pool))
            .with_strategy(SelectionStrategy::Random)
            .with_proxy_protocol(true)
            .with_handshake_timeout(Duration::from_secs(3))
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(proxy.router().pool().unwrap(), &pool));
        assert_eq!(proxy.router().strategy(), SelectionStrategy::Random);
        assert!(proxy.proxy_protocol());
        assert_eq!(proxy.handshake_timeout(), Duration::from_secs(3));
    }
}
