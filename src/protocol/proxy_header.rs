//! HAProxy PROXY protocol preamble (v1 text, v2 binary)
//!
//! When the proxy sits behind a load balancer, the first bytes of every
//! connection describe the original client. [`read_proxy_header`] consumes
//! exactly those bytes so the SOCKS5 handshake starts right after them.
//!
//! The header is optional: [`has_proxy_header`] peeks at the stream so a
//! client connecting directly keeps its first bytes for the SOCKS5 greeting.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

use crate::constants::proxy_header::{
    V1_MAX_LEN, V1_PREFIX, V2_HEADER_LEN, V2_MAX_PAYLOAD, V2_SIGNATURE,
};

/// Bytes read before deciding between v1 and v2
const PREFIX_LEN: usize = V1_PREFIX.len();

/// Wait between peeks while only part of a signature has arrived
const PEEK_RETRY: Duration = Duration::from_millis(5);

const V2_VERSION: u8 = 0x2;
const V2_CMD_LOCAL: u8 = 0x0;
const V2_CMD_PROXY: u8 = 0x1;
const V2_AF_INET: u8 = 0x1;
const V2_AF_INET6: u8 = 0x2;
const V2_TRANSPORT_DGRAM: u8 = 0x2;
const V2_INET_ADDRS_LEN: usize = 12;
const V2_INET6_ADDRS_LEN: usize = 36;

/// Errors reading a PROXY protocol header
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProxyHeaderError {
    #[error("connection does not start with a PROXY protocol header")]
    MissingSignature,

    #[error("PROXY v1 header longer than {V1_MAX_LEN} bytes")]
    V1TooLong,

    #[error("malformed PROXY v1 header: {0}")]
    MalformedV1(String),

    #[error("unsupported PROXY v2 version {0:#x}")]
    UnsupportedVersion(u8),

    #[error("unsupported PROXY v2 command {0:#x}")]
    UnsupportedCommand(u8),

    #[error("PROXY v2 address block of {len} bytes too short for family {family:#x}")]
    TruncatedAddresses { family: u8, len: usize },

    #[error("PROXY v2 payload of {0} bytes exceeds limit")]
    PayloadTooLarge(usize),

    #[error("PROXY header describes a datagram connection")]
    NonStreamTransport,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Decoded PROXY header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyHeader {
    /// Connection originated by the balancer itself (v2 `LOCAL`)
    Local,
    /// Proxied, but the original addresses are unknown or not IP
    Unknown,
    /// Proxied TCP connection with its original endpoints
    Proxied {
        source: SocketAddr,
        destination: SocketAddr,
    },
}

impl ProxyHeader {
    /// Original client address, if the header carries one
    #[must_use]
    pub const fn source(&self) -> Option<SocketAddr> {
        match self {
            Self::Proxied { source, .. } => Some(*source),
            Self::Local | Self::Unknown => None,
        }
    }

    /// Client address to use: the header's source, else the socket peer
    #[must_use]
    pub fn client_addr(&self, peer: SocketAddr) -> SocketAddr {
        self.source().unwrap_or(peer)
    }
}

/// Parse a v1 line without its trailing CRLF
///
/// `PROXY TCP4|TCP6 <src> <dst> <sport> <dport>` or `PROXY UNKNOWN ...`
///
/// # Errors
/// [`ProxyHeaderError::MalformedV1`] describing the first bad field.
pub fn parse_v1(line: &str) -> Result<ProxyHeader, ProxyHeaderError> {
    let malformed = |what: &str| ProxyHeaderError::MalformedV1(what.to_string());

    let mut fields = line.split(' ');
    if fields.next() != Some("PROXY") {
        return Err(malformed("missing PROXY keyword"));
    }

    let is_v4 = match fields.next() {
        Some("TCP4") => true,
        Some("TCP6") => false,
        Some("UNKNOWN") => return Ok(ProxyHeader::Unknown),
        Some(other) => return Err(malformed(&format!("unknown protocol '{}'", other))),
        None => return Err(malformed("missing protocol")),
    };

    let mut next_ip = |name: &str| -> Result<IpAddr, ProxyHeaderError> {
        let text = fields.next().ok_or_else(|| malformed(name))?;
        let ip: IpAddr = text
            .parse()
            .map_err(|_| malformed(&format!("invalid {} '{}'", name, text)))?;
        if ip.is_ipv4() != is_v4 {
            return Err(malformed(&format!("{} '{}' does not match protocol", name, text)));
        }
        Ok(ip)
    };
    let source_ip = next_ip("source address")?;
    let destination_ip = next_ip("destination address")?;

    let mut next_port = |name: &str| -> Result<u16, ProxyHeaderError> {
        let text = fields.next().ok_or_else(|| malformed(name))?;
        // Leading zeros are forbidden by the protocol
        if text.len() > 1 && text.starts_with('0') {
            return Err(malformed(&format!("invalid {} '{}'", name, text)));
        }
        text.parse()
            .map_err(|_| malformed(&format!("invalid {} '{}'", name, text)))
    };
    let source_port = next_port("source port")?;
    let destination_port = next_port("destination port")?;

    if fields.next().is_some() {
        return Err(malformed("trailing fields"));
    }

    Ok(ProxyHeader::Proxied {
        source: SocketAddr::new(source_ip, source_port),
        destination: SocketAddr::new(destination_ip, destination_port),
    })
}

/// Parse a v2 header from its version/command byte, family byte and payload
///
/// TLVs following the address block are ignored.
///
/// # Errors
/// Unsupported version or command, datagram transport, or a payload too
/// short for the announced family.
pub fn parse_v2(ver_cmd: u8, family: u8, payload: &[u8]) -> Result<ProxyHeader, ProxyHeaderError> {
    let version = ver_cmd >> 4;
    if version != V2_VERSION {
        return Err(ProxyHeaderError::UnsupportedVersion(version));
    }

    match ver_cmd & 0x0F {
        V2_CMD_LOCAL => return Ok(ProxyHeader::Local),
        V2_CMD_PROXY => {}
        other => return Err(ProxyHeaderError::UnsupportedCommand(other)),
    }

    if family & 0x0F == V2_TRANSPORT_DGRAM {
        return Err(ProxyHeaderError::NonStreamTransport);
    }

    let address_family = family >> 4;
    let truncated = || ProxyHeaderError::TruncatedAddresses {
        family: address_family,
        len: payload.len(),
    };

    match address_family {
        V2_AF_INET => {
            let block = payload.get(..V2_INET_ADDRS_LEN).ok_or_else(truncated)?;
            let ip = |at: usize| {
                IpAddr::V4(Ipv4Addr::new(
                    block[at],
                    block[at + 1],
                    block[at + 2],
                    block[at + 3],
                ))
            };
            let port = |at: usize| u16::from_be_bytes([block[at], block[at + 1]]);
            Ok(ProxyHeader::Proxied {
                source: SocketAddr::new(ip(0), port(8)),
                destination: SocketAddr::new(ip(4), port(10)),
            })
        }
        V2_AF_INET6 => {
            let block = payload.get(..V2_INET6_ADDRS_LEN).ok_or_else(truncated)?;
            let ip = |at: usize| {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&block[at..at + 16]);
                IpAddr::V6(Ipv6Addr::from(octets))
            };
            let port = |at: usize| u16::from_be_bytes([block[at], block[at + 1]]);
            Ok(ProxyHeader::Proxied {
                source: SocketAddr::new(ip(0), port(32)),
                destination: SocketAddr::new(ip(16), port(34)),
            })
        }
        // AF_UNSPEC and AF_UNIX carry no usable client IP
        _ => Ok(ProxyHeader::Unknown),
    }
}

/// Read and decode the PROXY header at the start of `stream`
///
/// Consumes exactly the header bytes, nothing after them.
///
/// # Errors
/// [`ProxyHeaderError::MissingSignature`] if the stream starts with anything
/// else, plus the parse errors of [`parse_v1`] and [`parse_v2`].
pub async fn read_proxy_header<S>(stream: &mut S) -> Result<ProxyHeader, ProxyHeaderError>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    stream.read_exact(&mut prefix).await?;

    if &prefix == V1_PREFIX {
        read_v1_line(stream, &prefix).await
    } else if prefix[..] == V2_SIGNATURE[..PREFIX_LEN] {
        read_v2(stream, &prefix).await
    } else {
        Err(ProxyHeaderError::MissingSignature)
    }
}

/// Whether `stream` opens with a v1 or v2 signature, without consuming anything
///
/// Answers `false` as soon as the bytes received so far rule out both
/// signatures, and on EOF. Waits while they are still a prefix of one.
///
/// # Errors
/// I/O errors from peeking the socket.
pub async fn has_proxy_header(stream: &TcpStream) -> io::Result<bool> {
    let mut prefix = [0u8; PREFIX_LEN];
    loop {
        let n = stream.peek(&mut prefix).await?;
        let seen = &prefix[..n];

        if n == 0 || !(V1_PREFIX.starts_with(seen) || V2_SIGNATURE.starts_with(seen)) {
            return Ok(false);
        }
        if n == PREFIX_LEN {
            return Ok(true);
        }
        tokio::time::sleep(PEEK_RETRY).await;
    }
}

async fn read_v1_line<S>(stream: &mut S, prefix: &[u8]) -> Result<ProxyHeader, ProxyHeaderError>
where
    S: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(V1_MAX_LEN);
    line.extend_from_slice(prefix);

    // Byte at a time so nothing past the CRLF is consumed
    loop {
        if line.len() >= V1_MAX_LEN {
            return Err(ProxyHeaderError::V1TooLong);
        }
        let byte = stream.read_u8().await?;
        line.push(byte);
        if byte == b'\n' {
            break;
        }
    }

    let Some(body) = line.strip_suffix(b"\r\n") else {
        return Err(ProxyHeaderError::MalformedV1("line not terminated by CRLF".into()));
    };
    let text = std::str::from_utf8(body)
        .map_err(|_| ProxyHeaderError::MalformedV1("not ASCII".into()))?;
    parse_v1(text)
}

async fn read_v2<S>(stream: &mut S, prefix: &[u8]) -> Result<ProxyHeader, ProxyHeaderError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; V2_HEADER_LEN];
    header[..prefix.len()].copy_from_slice(prefix);
    stream.read_exact(&mut header[prefix.len()..]).await?;

    if header[..V2_SIGNATURE.len()] != V2_SIGNATURE {
        return Err(ProxyHeaderError::MissingSignature);
    }

    let len = usize::from(u16::from_be_bytes([header[14], header[15]]));
    if len > V2_MAX_PAYLOAD {
        return Err(ProxyHeaderError::PayloadTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;

    parse_v2(header[12], header[13], &payload)
}
