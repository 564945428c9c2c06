//! Usable-address model for a single subnet
//!
//! Small subnets (fewer than 8 addresses) are used in full. Larger subnets
//! lose the network address, the conventional gateway (`.1`) and the
//! all-ones broadcast address.

use num_bigint::BigUint;

use crate::constants::pool::{
    LARGE_SUBNET_START_OFFSET, RESERVED_ADDRESSES, SMALL_SUBNET_THRESHOLD,
};

/// Selectable address count of a subnet and where the selectable range starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capacity {
    usable: BigUint,
    start_offset: u8,
}

impl Capacity {
    /// Compute the capacity of a subnet with `prefix_len` out of `max_prefix_len` bits
    ///
    /// `max_prefix_len` is 32 for IPv4 and 128 for IPv6. A prefix longer than the
    /// address width is clamped, so the result is always a single address.
    #[must_use]
    pub fn for_prefix(prefix_len: u8, max_prefix_len: u8) -> Self {
        let host_bits = max_prefix_len.saturating_sub(prefix_len);
        let size = BigUint::from(1u8) << host_bits;

        if size < BigUint::from(SMALL_SUBNET_THRESHOLD) {
            Self {
                usable: size,
                start_offset: 0,
            }
        } else {
            Self {
                usable: size - BigUint::from(RESERVED_ADDRESSES),
                start_offset: LARGE_SUBNET_START_OFFSET,
            }
        }
    }

    /// Number of selectable addresses
    #[must_use]
    #[inline]
    pub fn usable(&self) -> &BigUint {
        &self.usable
    }

    /// Offset from the network address of the first selectable address
    #[must_use]
    #[inline]
    pub const fn start_offset(&self) -> u8 {
        self.start_offset
    }

    /// True when no address of the subnet can be selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.usable == BigUint::ZERO
    }
}
