//! Constants used throughout the subnet proxy
//!
//! This module centralizes magic numbers and protocol values
//! to improve maintainability and reduce duplication.

use std::time::Duration;

/// Address pool constants
pub mod pool {
    /// Subnets with fewer addresses than this are fully usable
    pub const SMALL_SUBNET_THRESHOLD: u8 = 8;

    /// Addresses reserved in large subnets: network, gateway and broadcast
    pub const RESERVED_ADDRESSES: u8 = 3;

    /// Offset of the first usable address in large subnets (skips network + gateway)
    pub const LARGE_SUBNET_START_OFFSET: u8 = 2;

    /// Namespace prepended to selection keys before hashing
    ///
    /// Keeps sticky selection independent from other digests of the same client address.
    pub const HASH_NAMESPACE: &str = "subnetproxy:";

    /// Prefix length of `::ffff:0:0/96`, the IPv4-mapped IPv6 block
    pub const IPV4_MAPPED_PREFIX_LEN: u8 = 96;

    /// Prefix length used to bucket IPv6 clients
    pub const IPV6_BUCKET_PREFIX_LEN: u8 = 64;

    const _RESERVED_FITS: () = assert!(RESERVED_ADDRESSES < SMALL_SUBNET_THRESHOLD);
}

/// SOCKS5 wire constants (RFC 1928)
pub mod socks5 {
    /// Protocol version byte
    pub const VERSION: u8 = 0x05;

    /// Authentication method: no authentication required
    pub const METHOD_NO_AUTH: u8 = 0x00;
    /// Authentication method reply: no acceptable methods
    pub const METHOD_NO_ACCEPTABLE: u8 = 0xFF;

    /// Command: CONNECT
    pub const CMD_CONNECT: u8 = 0x01;

    /// Address type: IPv4
    pub const ATYP_IPV4: u8 = 0x01;
    /// Address type: domain name
    pub const ATYP_DOMAIN: u8 = 0x03;
    /// Address type: IPv6
    pub const ATYP_IPV6: u8 = 0x04;

    /// Reply: succeeded
    pub const REPLY_SUCCEEDED: u8 = 0x00;
    /// Reply: general SOCKS server failure
    pub const REPLY_GENERAL_FAILURE: u8 = 0x01;
    /// Reply: network unreachable
    pub const REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
    /// Reply: host unreachable
    pub const REPLY_HOST_UNREACHABLE: u8 = 0x04;
    /// Reply: connection refused
    pub const REPLY_CONNECTION_REFUSED: u8 = 0x05;
    /// Reply: command not supported
    pub const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
    /// Reply: address type not supported
    pub const REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;
}

/// PROXY protocol constants (HAProxy v1/v2)
pub mod proxy_header {
    /// Maximum length of a v1 header line including CRLF
    pub const V1_MAX_LEN: usize = 107;

    /// v1 header prefix
    pub const V1_PREFIX: &[u8; 6] = b"PROXY ";

    /// v2 binary signature
    pub const V2_SIGNATURE: [u8; 12] = [
        0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
    ];

    /// v2 fixed header length (signature + ver/cmd + family + len)
    pub const V2_HEADER_LEN: usize = 16;

    /// Upper bound on v2 payload we are willing to buffer
    pub const V2_MAX_PAYLOAD: usize = 4096;
}

/// Timeout constants
pub mod timeout {
    use super::Duration;

    /// Default time allowed for the PROXY header and SOCKS5 handshake
    pub const HANDSHAKE: Duration = Duration::from_secs(10);
}

/// Listener defaults
pub mod listen {
    /// Default SOCKS5 listen port
    pub const DEFAULT_PORT: u16 = 1080;

    /// Default bind host (all interfaces)
    pub const DEFAULT_HOST: &str = "0.0.0.0";
}
