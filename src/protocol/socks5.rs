//! SOCKS5 server side (RFC 1928)
//!
//! Supports the `NO AUTHENTICATION REQUIRED` method and the `CONNECT`
//! command with IPv4, IPv6 and domain destinations. The outbound connection
//! is opened through an [`EgressPlan`], so its source address and the
//! families it may reach are decided by the router.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::connection_error::ConnectionError;
use crate::constants::socks5::*;
use crate::router::EgressPlan;

/// Errors ending a SOCKS5 session before or while connecting
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Socks5Error {
    #[error("unsupported SOCKS version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("client offered no acceptable authentication method")]
    NoAcceptableMethod,

    #[error("unsupported command {0:#04x}")]
    UnsupportedCommand(u8),

    #[error("unsupported address type {0:#04x}")]
    UnsupportedAddressType(u8),

    #[error("domain name in request is not valid UTF-8")]
    InvalidDomain,

    #[error("handshake not completed within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("failed to reach {destination}: {source}")]
    Connect {
        destination: Destination,
        #[source]
        source: ConnectionError,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Socks5Error {
    /// Log level for this error; clients that simply go away are not worth a warning
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        match self {
            Self::Connect { source, .. } => source.log_level(),
            Self::Io(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::UnexpectedEof
                        | io::ErrorKind::BrokenPipe
                        | io::ErrorKind::ConnectionReset
                ) =>
            {
                tracing::Level::DEBUG
            }
            _ => tracing::Level::WARN,
        }
    }
}

/// Target requested by a SOCKS client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// IPv4 or IPv6 literal
    Addr(SocketAddr),
    /// Domain name resolved by the proxy
    Domain(String, u16),
}

impl Destination {
    #[must_use]
    pub fn port(&self) -> u16 {
        match self {
            Self::Addr(addr) => addr.port(),
            Self::Domain(_, port) => *port,
        }
    }

    /// Open a TCP connection to this destination following `plan`
    ///
    /// Literals are dialed directly; domains go through the plan's resolver so
    /// only addresses of the egress family are tried.
    ///
    /// # Errors
    /// Resolution and dial failures as [`ConnectionError`].
    pub async fn connect(&self, plan: &EgressPlan) -> Result<TcpStream, ConnectionError> {
        let address = match self {
            Self::Addr(addr) => *addr,
            Self::Domain(host, port) => plan.resolver().resolve(host, *port).await?,
        };
        plan.dialer().connect(address).await
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addr(addr) => write!(f, "{}", addr),
            Self::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

/// Bytes relayed in each direction of a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub client_to_target: u64,
    pub target_to_client: u64,
}

impl TransferStats {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.client_to_target + self.target_to_client
    }
}

/// Reply code sent to the client for a failed connect
#[must_use]
pub fn reply_code(err: &ConnectionError) -> u8 {
    match err {
        ConnectionError::FamilyMismatch { .. } => REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
        ConnectionError::NoAddressForFamily { .. } | ConnectionError::DnsResolution { .. } => {
            REPLY_HOST_UNREACHABLE
        }
        _ => match err.io_error_kind() {
            Some(io::ErrorKind::ConnectionRefused) => REPLY_CONNECTION_REFUSED,
            Some(io::ErrorKind::NetworkUnreachable) => REPLY_NETWORK_UNREACHABLE,
            Some(io::ErrorKind::HostUnreachable) => REPLY_HOST_UNREACHABLE,
            _ => REPLY_GENERAL_FAILURE,
        },
    }
}

/// Encode a reply: `VER | REP | RSV | ATYP | BND.ADDR | BND.PORT`
#[must_use]
pub fn encode_reply(code: u8, bound: SocketAddr) -> Vec<u8> {
    let mut reply = Vec::with_capacity(22);
    reply.extend_from_slice(&[VERSION, code, 0x00]);
    match bound.ip() {
        IpAddr::V4(ip) => {
            reply.push(ATYP_IPV4);
            reply.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            reply.push(ATYP_IPV6);
            reply.extend_from_slice(&ip.octets());
        }
    }
    reply.extend_from_slice(&bound.port().to_be_bytes());
    reply
}

/// Reply with an unspecified IPv4 bound address, used for failures
async fn send_failure<S>(stream: &mut S, code: u8) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let unspecified = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    stream.write_all(&encode_reply(code, unspecified)).await
}

/// Method negotiation: accept only `NO AUTH`
async fn negotiate<S>(stream: &mut S) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != VERSION {
        return Err(Socks5Error::UnsupportedVersion(header[0]));
    }

    let mut methods = vec![0u8; usize::from(header[1])];
    stream.read_exact(&mut methods).await?;

    if !methods.contains(&METHOD_NO_AUTH) {
        stream.write_all(&[VERSION, METHOD_NO_ACCEPTABLE]).await?;
        return Err(Socks5Error::NoAcceptableMethod);
    }

    stream.write_all(&[VERSION, METHOD_NO_AUTH]).await?;
    Ok(())
}

/// Read a request: `VER | CMD | RSV | ATYP | DST.ADDR | DST.PORT`
///
/// Unsupported commands and address types are answered before returning the error.
async fn read_request<S>(stream: &mut S) -> Result<Destination, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let [version, command, _reserved, address_type] = header;

    if version != VERSION {
        return Err(Socks5Error::UnsupportedVersion(version));
    }
    if command != CMD_CONNECT {
        send_failure(stream, REPLY_COMMAND_NOT_SUPPORTED).await?;
        return Err(Socks5Error::UnsupportedCommand(command));
    }

    let destination = match address_type {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            let port = stream.read_u16().await?;
            Destination::Addr(SocketAddr::new(Ipv4Addr::from(octets).into(), port))
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            let port = stream.read_u16().await?;
            Destination::Addr(SocketAddr::new(Ipv6Addr::from(octets).into(), port))
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await?;
            let mut name = vec![0u8; usize::from(len)];
            stream.read_exact(&mut name).await?;
            let port = stream.read_u16().await?;
            let name = String::from_utf8(name).map_err(|_| Socks5Error::InvalidDomain)?;
            Destination::Domain(name, port)
        }
        other => {
            send_failure(stream, REPLY_ADDRESS_TYPE_NOT_SUPPORTED).await?;
            return Err(Socks5Error::UnsupportedAddressType(other));
        }
    };

    Ok(destination)
}

/// Run negotiation and read the CONNECT request within `timeout`
///
/// # Errors
/// [`Socks5Error::HandshakeTimeout`] if the client is too slow, or the
/// protocol error that ended the handshake.
pub async fn accept_request<S>(stream: &mut S, timeout: Duration) -> Result<Destination, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, async {
        negotiate(stream).await?;
        read_request(stream).await
    })
    .await
    .map_err(|_| Socks5Error::HandshakeTimeout(timeout))?
}

/// Complete the handshake and open the outbound connection
///
/// On success the client has been sent a success reply carrying the
/// outbound socket's local address; on connect failure it has been sent
/// the matching failure reply.
///
/// # Errors
/// Any [`Socks5Error`]; the client stream should be dropped afterwards.
pub async fn handshake<S>(
    client: &mut S,
    plan: &EgressPlan,
    timeout: Duration,
) -> Result<(TcpStream, Destination), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let destination = accept_request(client, timeout).await?;
    debug!("SOCKS5 CONNECT {} via {}", destination, plan);

    let outbound = match destination.connect(plan).await {
        Ok(stream) => stream,
        Err(source) => {
            // The client may already be gone; the connect error is what matters
            let _ = send_failure(client, reply_code(&source)).await;
            return Err(Socks5Error::Connect {
                destination,
                source,
            });
        }
    };

    let bound = outbound.local_addr()?;
    client
        .write_all(&encode_reply(REPLY_SUCCEEDED, bound))
        .await?;

    Ok((outbound, destination))
}

/// Relay bytes both ways until either side closes
///
/// # Errors
/// I/O errors from either stream.
pub async fn relay<S>(client: &mut S, outbound: &mut TcpStream) -> io::Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (client_to_target, target_to_client) =
        tokio::io::copy_bidirectional(client, outbound).await?;
    Ok(TransferStats {
        client_to_target,
        target_to_client,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn connect_request(atyp: u8, addr: &[u8], port: u16) -> Vec<u8> {
        let mut req = vec![VERSION, CMD_CONNECT, 0x00, atyp];
        req.extend_from_slice(addr);
        req.extend_from_slice(&port.to_be_bytes());
        req
    }

    #[test]
    fn test_encode_reply_ipv4() {
        let reply = encode_reply(REPLY_SUCCEEDED, "10.0.0.2:4321".parse().unwrap());
        assert_eq!(reply, vec![5, 0, 0, 1, 10, 0, 0, 2, 0x10, 0xE1]);
    }

    #[test]
    fn test_encode_reply_ipv6() {
        let reply = encode_reply(REPLY_HOST_UNREACHABLE, "[2001:db8::1]:80".parse().unwrap());
        assert_eq!(reply.len(), 22);
        assert_eq!(&reply[..4], &[5, 4, 0, 4]);
        assert_eq!(&reply[20..], &[0, 80]);
    }

    #[test]
    fn test_reply_code_mapping() {
        let refused = ConnectionError::TcpConnect {
            destination: "192.0.2.1:80".parse().unwrap(),
            local: None,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(reply_code(&refused), REPLY_CONNECTION_REFUSED);

        let unreachable = ConnectionError::TcpConnect {
            destination: "192.0.2.1:80".parse().unwrap(),
            local: None,
            source: io::Error::from(io::ErrorKind::NetworkUnreachable),
        };
        assert_eq!(reply_code(&unreachable), REPLY_NETWORK_UNREACHABLE);

        let mismatch = ConnectionError::FamilyMismatch {
            local: "10.0.0.2".parse().unwrap(),
            destination: "[2001:db8::1]:80".parse().unwrap(),
        };
        assert_eq!(reply_code(&mismatch), REPLY_ADDRESS_TYPE_NOT_SUPPORTED);

        let no_family = ConnectionError::NoAddressForFamily {
            host: "v6.example".to_string(),
            family: crate::network::AddressFamily::V4,
        };
        assert_eq!(reply_code(&no_family), REPLY_HOST_UNREACHABLE);

        let bind = ConnectionError::Bind {
            local: "10.0.0.2".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrNotAvailable),
        };
        assert_eq!(reply_code(&bind), REPLY_GENERAL_FAILURE);
    }

    #[tokio::test]
    async fn test_accept_request_ipv4() {
        let (mut client, mut server) = duplex(256);

        client.write_all(&[5, 2, 0x02, 0x00]).await.unwrap();
        client
            .write_all(&connect_request(ATYP_IPV4, &[192, 0, 2, 7], 443))
            .await
            .unwrap();

        let destination = accept_request(&mut server, TIMEOUT).await.unwrap();
        assert_eq!(
            destination,
            Destination::Addr("192.0.2.7:443".parse().unwrap())
        );

        let mut method = [0u8; 2];
        client.read_exact(&mut method).await.unwrap();
        assert_eq!(method, [VERSION, METHOD_NO_AUTH]);
    }

    #[tokio::test]
    async fn test_accept_request_domain() {
        let (mut client, mut server) = duplex(256);

        let mut addr = vec![11];
        addr.extend_from_slice(b"example.com");
        client.write_all(&[5, 1, 0]).await.unwrap();
        client
            .write_all(&connect_request(ATYP_DOMAIN, &addr, 80))
            .await
            .unwrap();

        let destination = accept_request(&mut server, TIMEOUT).await.unwrap();
        assert_eq!(destination, Destination::Domain("example.com".into(), 80));
        assert_eq!(destination.to_string(), "example.com:80");
        assert_eq!(destination.port(), 80);
    }

    #[tokio::test]
    async fn test_accept_request_ipv6() {
        let (mut client, mut server) = duplex(256);

        let ip: Ipv6Addr = "2001:db8::9".parse().unwrap();
        client.write_all(&[5, 1, 0]).await.unwrap();
        client
            .write_all(&connect_request(ATYP_IPV6, &ip.octets(), 8080))
            .await
            .unwrap();

        let destination = accept_request(&mut server, TIMEOUT).await.unwrap();
        assert_eq!(
            destination,
            Destination::Addr("[2001:db8::9]:8080".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_no_acceptable_method() {
        let (mut client, mut server) = duplex(64);

        // Only username/password offered
        client.write_all(&[5, 1, 0x02]).await.unwrap();

        let err = accept_request(&mut server, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Socks5Error::NoAcceptableMethod));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [VERSION, METHOD_NO_ACCEPTABLE]);
    }

    #[tokio::test]
    async fn test_wrong_version() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[4, 1, 0]).await.unwrap();

        let err = accept_request(&mut server, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedVersion(4)));
    }

    #[tokio::test]
    async fn test_bind_command_rejected() {
        let (mut client, mut server) = duplex(256);

        client.write_all(&[5, 1, 0]).await.unwrap();
        client
            .write_all(&[VERSION, 0x02, 0x00, ATYP_IPV4, 127, 0, 0, 1, 0, 80])
            .await
            .unwrap();

        let err = accept_request(&mut server, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedCommand(0x02)));

        let mut response = [0u8; 12];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response[2..4], [VERSION, REPLY_COMMAND_NOT_SUPPORTED]);
    }

    #[tokio::test]
    async fn test_unknown_address_type_rejected() {
        let (mut client, mut server) = duplex(256);

        client.write_all(&[5, 1, 0]).await.unwrap();
        client
            .write_all(&[VERSION, CMD_CONNECT, 0x00, 0x09])
            .await
            .unwrap();

        let err = accept_request(&mut server, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedAddressType(0x09)));

        let mut response = [0u8; 12];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response[3], REPLY_ADDRESS_TYPE_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (_client, mut server) = duplex(64);

        let err = accept_request(&mut server, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Socks5Error::HandshakeTimeout(_)));
        assert_eq!(err.log_level(), tracing::Level::WARN);
    }

    #[tokio::test]
    async fn test_client_eof_logs_at_debug() {
        let (client, mut server) = duplex(64);
        drop(client);

        let err = accept_request(&mut server, TIMEOUT).await.unwrap_err();
        assert_eq!(err.log_level(), tracing::Level::DEBUG);
    }

    #[tokio::test]
    async fn test_handshake_connects_and_relays() {
        let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target_addr = target.local_addr().unwrap();

        let echo = tokio::spawn(async move {
            let (mut stream, _) = target.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let (mut client, mut server) = duplex(1024);
        let session = tokio::spawn(async move {
            let plan = EgressPlan::Bound("127.0.0.1".parse().unwrap());
            let (mut outbound, destination) = handshake(&mut server, &plan, TIMEOUT).await.unwrap();
            let stats = relay(&mut server, &mut outbound).await.unwrap();
            (destination, stats)
        });

        client.write_all(&[5, 1, 0]).await.unwrap();
        client
            .write_all(&connect_request(ATYP_IPV4, &[127, 0, 0, 1], target_addr.port()))
            .await
            .unwrap();

        let mut method = [0u8; 2];
        client.read_exact(&mut method).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], REPLY_SUCCEEDED);
        assert_eq!(&reply[4..8], &[127, 0, 0, 1]);

        client.write_all(b"hello").await.unwrap();
        let mut echoed = [0u8; 5];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"hello");

        echo.await.unwrap();
        drop(client);

        let (destination, stats) = session.await.unwrap();
        assert_eq!(destination, Destination::Addr(target_addr));
        assert_eq!(stats.client_to_target, 5);
        assert_eq!(stats.target_to_client, 5);
        assert_eq!(stats.total(), 10);
    }

    #[tokio::test]
    async fn test_handshake_family_mismatch_reply() {
        let (mut client, mut server) = duplex(256);

        let ip: Ipv6Addr = "::1".parse().unwrap();
        client.write_all(&[5, 1, 0]).await.unwrap();
        client
            .write_all(&connect_request(ATYP_IPV6, &ip.octets(), 80))
            .await
            .unwrap();

        let plan = EgressPlan::Bound("127.0.0.1".parse().unwrap());
        let err = handshake(&mut server, &plan, TIMEOUT).await.unwrap_err();
        assert!(matches!(
            err,
            Socks5Error::Connect {
                source: ConnectionError::FamilyMismatch { .. },
                ..
            }
        ));

        let mut response = [0u8; 12];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response[3], REPLY_ADDRESS_TYPE_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_handshake_connection_refused_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_port = listener.local_addr().unwrap().port();
        drop(listener);

        let (mut client, mut server) = duplex(256);
        client.write_all(&[5, 1, 0]).await.unwrap();
        client
            .write_all(&connect_request(ATYP_IPV4, &[127, 0, 0, 1], closed_port))
            .await
            .unwrap();

        let err = handshake(&mut server, &EgressPlan::Default, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Socks5Error::Connect { .. }));

        let mut response = [0u8; 12];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response[3], REPLY_CONNECTION_REFUSED);
    }
}
