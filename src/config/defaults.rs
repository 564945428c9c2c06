//! Default values for configuration fields

use std::time::Duration;

use crate::constants::timeout::HANDSHAKE;

/// Default time allowed for the PROXY header and SOCKS5 handshake
#[inline]
pub fn handshake_timeout() -> Duration {
    HANDSHAKE
}
