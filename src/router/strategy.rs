//! Egress address selection strategies
//!
//! - Hash: sticky, the client's address is the selection key
//! - Random: uniform over every usable address, ignores the client

use std::net::IpAddr;

use crate::config::SelectionStrategy;
use crate::pool::AddressPool;

impl SelectionStrategy {
    /// Pick an egress address from `pool` for a client connecting from `client`
    ///
    /// IPv4-mapped client addresses are keyed by their IPv4 form so a client
    /// keeps its egress address whether it arrives over IPv4 or a dual-stack socket.
    #[must_use]
    pub fn select(self, pool: &AddressPool, client: IpAddr) -> IpAddr {
        match self {
            Self::Hash => pool.select_by_key(&client.to_canonical().to_string()),
            Self::Random => pool.select_randomly(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> AddressPool {
        AddressPool::new(["10.0.0.0/24", "10.0.1.0/24"]).unwrap()
    }

    #[test]
    fn test_hash_strategy_sticky_per_client() {
        let pool = pool();
        let client: IpAddr = "198.51.100.20".parse().unwrap();

        let first = SelectionStrategy::Hash.select(&pool, client);
        for _ in 0..20 {
            assert_eq!(SelectionStrategy::Hash.select(&pool, client), first);
        }
        assert_eq!(first, pool.select_by_key("198.51.100.20"));
    }

    #[test]
    fn test_hash_strategy_ipv4_mapped_client() {
        let pool = pool();
        let plain: IpAddr = "198.51.100.20".parse().unwrap();
        let mapped: IpAddr = "::ffff:198.51.100.20".parse().unwrap();

        assert_eq!(
            SelectionStrategy::Hash.select(&pool, plain),
            SelectionStrategy::Hash.select(&pool, mapped)
        );
    }

    #[test]
    fn test_random_strategy_ignores_client() {
        let pool = pool();
        let client: IpAddr = "198.51.100.20".parse().unwrap();

        let picks: std::collections::HashSet<IpAddr> = (0..200)
            .map(|_| SelectionStrategy::Random.select(&pool, client))
            .collect();

        // 200 draws over 506 addresses all landing on one address is practically impossible
        assert!(picks.len() > 1);
        assert!(picks.iter().all(|ip| pool.contains(*ip)));
    }
}
