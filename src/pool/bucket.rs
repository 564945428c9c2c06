//! Client address bucketing
//!
//! Groups IPv4 clients by exact address and IPv6 clients by their /64, the
//! usual allocation unit handed to a single host.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv6Net;

use crate::constants::pool::IPV6_BUCKET_PREFIX_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressBucket {
    V4(Ipv4Addr),
    V6(Ipv6Net),
}

impl AddressBucket {
    /// Bucket for `ip`; IPv4-mapped IPv6 addresses are treated as IPv4
    #[must_use]
    pub fn for_ip(ip: IpAddr) -> Self {
        match ip.to_canonical() {
            IpAddr::V4(v4) => Self::V4(v4),
            IpAddr::V6(v6) => Self::V6(
                Ipv6Net::new(v6, IPV6_BUCKET_PREFIX_LEN)
                    .map(|net| net.trunc())
                    .unwrap_or_else(|_| Ipv6Net::from(v6)),
            ),
        }
    }
}

impl fmt::Display for AddressBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4(addr) => write!(f, "ipv4${}", addr),
            Self::V6(net) => write!(f, "ipv6${}", net.network()),
        }
    }
}
