//! Weighted multi-subnet address pool
//!
//! The pool lays every usable address of every configured subnet out on a
//! single virtual index line `[0, total)`. Each subnet owns a contiguous,
//! half-open slice of that line sized by its usable capacity, so drawing an
//! index uniformly selects subnets proportionally to their capacity.
//!
//! All counts are `BigUint`: one IPv6 /64 alone holds more addresses than a
//! `u64` can count.

use std::net::IpAddr;

use num_bigint::{BigUint, RandBigInt};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::PoolError;
use super::capacity::Capacity;
use super::subnet::Subnet;
use crate::constants::pool::HASH_NAMESPACE;

#[derive(Debug, Clone)]
struct PoolEntry {
    subnet: Subnet,
    capacity: Capacity,
    /// Sum of the capacities of all preceding entries
    before: BigUint,
    /// `before + capacity`, exclusive
    end: BigUint,
}

impl PoolEntry {
    #[inline]
    fn owns(&self, index: &BigUint) -> bool {
        index >= &self.before && index < &self.end
    }
}

/// Immutable set of egress subnets with capacity-weighted selection
///
/// Shared across connection tasks behind an `Arc`. Everything except
/// [`AddressPool::select_randomly`] is a plain read; the random generator is
/// the only mutable state and sits behind a mutex.
#[derive(Debug)]
pub struct AddressPool {
    entries: Vec<PoolEntry>,
    total: BigUint,
    rng: Mutex<StdRng>,
}

impl AddressPool {
    /// Build a pool from subnet specifications, in order
    ///
    /// Each spec is a bare IP literal or a CIDR prefix. The first malformed
    /// spec aborts construction. Subnets without usable addresses are skipped.
    ///
    /// # Errors
    /// - [`PoolError::InvalidSubnet`] naming the offending token
    /// - [`PoolError::EmptyPool`] if no usable address remains
    pub fn new<I, S>(specs: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let subnets = specs
            .into_iter()
            .map(|spec| spec.as_ref().parse::<Subnet>())
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_subnets(subnets)
    }

    /// Build a pool from already-parsed subnets
    ///
    /// # Errors
    /// Returns [`PoolError::EmptyPool`] if the subnets hold no usable address.
    pub fn from_subnets(subnets: impl IntoIterator<Item = Subnet>) -> Result<Self, PoolError> {
        Self::with_rng(subnets, StdRng::from_entropy())
    }

    /// Build a pool with an explicit random generator (reproducible random selection)
    ///
    /// # Errors
    /// Returns [`PoolError::EmptyPool`] if the subnets hold no usable address.
    pub fn with_rng(
        subnets: impl IntoIterator<Item = Subnet>,
        rng: StdRng,
    ) -> Result<Self, PoolError> {
        let mut entries = Vec::new();
        let mut total = BigUint::ZERO;

        for subnet in subnets {
            let capacity = subnet.capacity();
            if capacity.is_empty() {
                debug!("Skipping subnet {} without usable addresses", subnet);
                continue;
            }

            let before = total.clone();
            total += capacity.usable();
            entries.push(PoolEntry {
                subnet,
                capacity,
                before,
                end: total.clone(),
            });
        }

        if total == BigUint::ZERO {
            return Err(PoolError::EmptyPool);
        }

        Ok(Self {
            entries,
            total,
            rng: Mutex::new(rng),
        })
    }

    /// Total number of selectable addresses
    #[must_use]
    #[inline]
    pub fn total(&self) -> &BigUint {
        &self.total
    }

    /// Subnets kept in the pool, in configuration order
    pub fn subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.entries.iter().map(|e| &e.subnet)
    }

    /// Number of subnets kept in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a constructed pool; provided for API symmetry with `len`
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Map a virtual index in `[0, total)` to a concrete address
    ///
    /// Out-of-range indices fall back to the first subnet's network address.
    #[must_use]
    pub fn translate(&self, index: &BigUint) -> IpAddr {
        for entry in &self.entries {
            if entry.owns(index) {
                let offset = index - &entry.before;
                return entry.subnet.address_at(&entry.capacity, &offset);
            }
        }

        // Only reachable on a caller bug; construction guarantees at least one entry
        self.entries[0].subnet.network()
    }

    /// True if `ip` falls inside any configured subnet (reserved addresses included)
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.entries.iter().any(|e| e.subnet.contains(ip))
    }

    /// Sticky selection: the same key always maps to the same address
    #[must_use]
    pub fn select_by_key(&self, key: &str) -> IpAddr {
        let mut hasher = Sha256::new();
        hasher.update(HASH_NAMESPACE.as_bytes());
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();

        let index = BigUint::from_bytes_be(&digest) % &self.total;
        self.translate(&index)
    }

    /// Uniform selection over every usable address of the pool
    #[must_use]
    pub fn select_randomly(&self) -> IpAddr {
        let index = self.rng.lock().gen_biguint_below(&self.total);
        self.translate(&index)
    }
}
