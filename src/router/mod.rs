//! Per-connection egress routing
//!
//! This module decides, for every accepted client, which local address the
//! outbound connection originates from.
//!
//! # Overview
//!
//! The `EgressRouter` holds the optional shared [`AddressPool`] and the
//! configured [`SelectionStrategy`]. Routing a client yields an
//! [`EgressPlan`], from which the session obtains a bound [`Dialer`] and a
//! family-constrained [`Resolver`].
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use subnet_proxy::config::SelectionStrategy;
//! use subnet_proxy::pool::AddressPool;
//! use subnet_proxy::router::EgressRouter;
//!
//! let pool = Arc::new(AddressPool::new(["10.0.0.0/24"]).unwrap());
//! let router = EgressRouter::new(Some(pool), SelectionStrategy::Hash);
//!
//! let plan = router.route("198.51.100.7".parse().unwrap());
//! assert!(plan.local_addr().is_some());
//! assert_eq!(plan, router.route("198.51.100.7".parse().unwrap()));
//! ```

mod strategy;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;

use crate::config::SelectionStrategy;
use crate::network::{Dialer, Resolver};
use crate::pool::AddressPool;

/// How one client's outbound connection is originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressPlan {
    /// Platform default source address, any destination family
    Default,
    /// Bind this local address; destinations restricted to its family
    Bound(IpAddr),
}

impl EgressPlan {
    /// Selected egress address, if any
    #[must_use]
    pub const fn local_addr(&self) -> Option<IpAddr> {
        match self {
            Self::Default => None,
            Self::Bound(ip) => Some(*ip),
        }
    }

    /// Dialer originating from this plan's address
    #[must_use]
    pub const fn dialer(&self) -> Dialer {
        match self {
            Self::Default => Dialer::system_default(),
            Self::Bound(ip) => Dialer::bound(*ip),
        }
    }

    /// Resolver matching this plan's address family
    #[must_use]
    pub fn resolver(&self) -> Resolver {
        self.dialer().resolver()
    }
}

impl fmt::Display for EgressPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Bound(ip) => write!(f, "{}", ip),
        }
    }
}

/// Selects egress addresses for clients
///
/// # Thread Safety
///
/// Cheap to share behind an `Arc`. Hash routing is a pure read of the pool;
/// random routing briefly locks the pool's generator.
#[derive(Debug, Clone)]
pub struct EgressRouter {
    pool: Option<Arc<AddressPool>>,
    strategy: SelectionStrategy,
}

impl EgressRouter {
    /// Create a router; `None` means every client uses the default egress
    #[must_use]
    pub fn new(pool: Option<Arc<AddressPool>>, strategy: SelectionStrategy) -> Self {
        Self { pool, strategy }
    }

    /// Router without a pool
    #[must_use]
    pub fn unpooled() -> Self {
        Self::new(None, SelectionStrategy::default())
    }

    #[must_use]
    pub fn pool(&self) -> Option<&Arc<AddressPool>> {
        self.pool.as_ref()
    }

    #[must_use]
    pub const fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Decide how to originate the outbound connection of `client`
    #[must_use]
    pub fn route(&self, client: IpAddr) -> EgressPlan {
        let Some(pool) = &self.pool else {
            return EgressPlan::Default;
        };

        let local = self.strategy.select(pool, client);
        debug!(
            "Selected egress {} for client {} ({} strategy)",
            local, client, self.strategy
        );
        EgressPlan::Bound(local)
    }
}

impl Default for EgressRouter {
    fn default() -> Self {
        Self::unpooled()
    }
}
