//! Subnet entries of the address pool
//!
//! A subnet is parsed either from a CIDR string (`10.0.0.0/24`) or from a bare
//! address, which becomes a single-address `/32` or `/128` subnet.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net};
use num_bigint::BigUint;

use super::PoolError;
use super::capacity::Capacity;
use crate::constants::pool::IPV4_MAPPED_PREFIX_LEN;

/// A parsed, immutable subnet with its address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet(IpNet);

impl Subnet {
    /// Wrap an `IpNet`, clearing any host bits of the prefix
    ///
    /// Prefixes inside `::ffff:0:0/96` become the IPv4 networks they map, so
    /// selected addresses are dialed as IPv4.
    #[must_use]
    pub fn new(net: IpNet) -> Self {
        Self(ipv4_unmapped(net).trunc())
    }

    /// Single-address subnet for a bare IP literal
    #[must_use]
    pub fn single(ip: IpAddr) -> Self {
        Self::new(IpNet::from(ip.to_canonical()))
    }

    /// Network (base) address
    #[must_use]
    #[inline]
    pub fn network(&self) -> IpAddr {
        self.0.network()
    }

    /// Prefix length in bits
    #[must_use]
    #[inline]
    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Address width in bits: 32 for IPv4, 128 for IPv6
    #[must_use]
    #[inline]
    pub fn max_prefix_len(&self) -> u8 {
        self.0.max_prefix_len()
    }

    #[must_use]
    #[inline]
    pub fn is_ipv4(&self) -> bool {
        matches!(self.0, IpNet::V4(_))
    }

    /// Usable capacity of this subnet
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        Capacity::for_prefix(self.prefix_len(), self.max_prefix_len())
    }

    /// True if `ip` lies anywhere in the subnet (reserved addresses included)
    ///
    /// IPv4-mapped IPv6 addresses are matched against IPv4 subnets.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip) || self.0.contains(&ip.to_canonical())
    }

    /// Concrete address at `offset` positions past the capacity's start offset
    ///
    /// The sum is computed with arbitrary precision and then truncated to the
    /// subnet's address width, left-padded with zeros.
    #[must_use]
    pub fn address_at(&self, capacity: &Capacity, offset: &BigUint) -> IpAddr {
        let value = ip_to_biguint(self.network()) + capacity.start_offset() + offset;

        if self.is_ipv4() {
            IpAddr::V4(Ipv4Addr::from(fixed_width::<4>(&value)))
        } else {
            IpAddr::V6(Ipv6Addr::from(fixed_width::<16>(&value)))
        }
    }

    /// Underlying network
    #[must_use]
    pub fn as_net(&self) -> &IpNet {
        &self.0
    }
}

impl FromStr for Subnet {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();

        if let Ok(ip) = token.parse::<IpAddr>() {
            return Ok(Self::single(ip));
        }

        token
            .parse::<IpNet>()
            .map(Self::new)
            .map_err(|_| PoolError::InvalidSubnet(token.to_string()))
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn ipv4_unmapped(net: IpNet) -> IpNet {
    let IpNet::V6(v6) = net else {
        return net;
    };
    if v6.prefix_len() < IPV4_MAPPED_PREFIX_LEN {
        return net;
    }

    v6.addr()
        .to_ipv4_mapped()
        .and_then(|v4| Ipv4Net::new(v4, v6.prefix_len() - IPV4_MAPPED_PREFIX_LEN).ok())
        .map_or(net, IpNet::V4)
}

fn ip_to_biguint(ip: IpAddr) -> BigUint {
    match ip {
        IpAddr::V4(v4) => BigUint::from(u32::from(v4)),
        IpAddr::V6(v6) => BigUint::from(u128::from(v6)),
    }
}

/// Big-endian bytes of `value`, keeping the low `N` bytes and zero-padding on the left
fn fixed_width<const N: usize>(value: &BigUint) -> [u8; N] {
    let bytes = value.to_bytes_be();
    let take = bytes.len().min(N);
    let mut out = [0u8; N];
    out[N - take..].copy_from_slice(&bytes[bytes.len() - take..]);
    out
}
