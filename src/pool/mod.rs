//! Egress address pool
//!
//! This module models the configured egress subnets as one weighted address
//! space and provides the two selection strategies on top of it.
//!
//! ## Module structure
//!
//! - [`capacity`]: usable-address count and start offset of a subnet
//! - [`subnet`]: subnet parsing (CIDR or bare address)
//! - [`address_pool`]: the pool, index translation, sticky and random selection
//! - [`bucket`]: client address bucketing by IPv4 address or IPv6 /64

pub mod address_pool;
pub mod bucket;
pub mod capacity;
pub mod subnet;

pub use address_pool::AddressPool;
pub use bucket::AddressBucket;
pub use capacity::Capacity;
pub use subnet::Subnet;

use thiserror::Error;

/// Errors raised while building an address pool
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PoolError {
    #[error("invalid IP or CIDR: {0}")]
    InvalidSubnet(String),

    #[error("address pool has no usable addresses")]
    EmptyPool,
}
