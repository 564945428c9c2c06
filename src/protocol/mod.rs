//! Wire protocols spoken with clients
//!
//! - [`proxy_header`]: HAProxy PROXY protocol v1/v2 preamble carrying the real client address
//! - [`socks5`]: RFC 1928 SOCKS5 server side (no authentication, CONNECT only)

pub mod proxy_header;
pub mod socks5;

pub use proxy_header::{ProxyHeader, ProxyHeaderError, read_proxy_header};
pub use socks5::{Destination, Socks5Error, TransferStats};
