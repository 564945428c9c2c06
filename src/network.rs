//! Outbound dialing and name resolution constrained to an egress address
//!
//! A [`Dialer`] originates every outbound connection from one selected local
//! address (or from the system default route), and the matching [`Resolver`]
//! only returns destination addresses of the same family so the dial never
//! mixes IPv4 and IPv6.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

use crate::connection_error::ConnectionError;

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Family of `ip`
    #[must_use]
    #[inline]
    pub const fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    #[must_use]
    #[inline]
    pub const fn matches(self, ip: IpAddr) -> bool {
        matches!(
            (self, ip),
            (Self::V4, IpAddr::V4(_)) | (Self::V6, IpAddr::V6(_))
        )
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V4 => "IPv4",
            Self::V6 => "IPv6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound TCP dialer, optionally bound to an egress address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialer {
    local: Option<IpAddr>,
}

impl Dialer {
    /// Dial using the platform's default source address selection
    #[must_use]
    pub const fn system_default() -> Self {
        Self { local: None }
    }

    /// Dial from `local`, restricted to destinations of the same family
    #[must_use]
    pub const fn bound(local: IpAddr) -> Self {
        Self { local: Some(local) }
    }

    /// Egress address this dialer binds, if any
    #[must_use]
    pub const fn local_addr(&self) -> Option<IpAddr> {
        self.local
    }

    /// Address family this dialer is restricted to, if any
    #[must_use]
    pub fn family(&self) -> Option<AddressFamily> {
        self.local.map(AddressFamily::of)
    }

    /// Resolver constrained to this dialer's family
    #[must_use]
    pub fn resolver(&self) -> Resolver {
        Resolver {
            family: self.family(),
        }
    }

    /// Open a TCP connection to `destination`
    ///
    /// # Errors
    /// - [`ConnectionError::FamilyMismatch`] if the destination family differs from the egress address
    /// - [`ConnectionError::Bind`] if the egress address cannot be bound
    /// - [`ConnectionError::TcpConnect`] if the connection itself fails
    pub async fn connect(&self, destination: SocketAddr) -> Result<TcpStream, ConnectionError> {
        let Some(local) = self.local else {
            return TcpStream::connect(destination)
                .await
                .map_err(|source| ConnectionError::TcpConnect {
                    destination,
                    local: None,
                    source,
                });
        };

        if !AddressFamily::of(local).matches(destination.ip()) {
            return Err(ConnectionError::FamilyMismatch { local, destination });
        }

        let socket = bound_socket(local)?;
        socket
            .connect(destination)
            .await
            .map_err(|source| ConnectionError::TcpConnect {
                destination,
                local: Some(local),
                source,
            })
    }
}

impl Default for Dialer {
    fn default() -> Self {
        Self::system_default()
    }
}

/// Create a non-blocking TCP socket bound to `local` on an ephemeral port
fn bound_socket(local: IpAddr) -> Result<TcpSocket, ConnectionError> {
    let bind_addr = SocketAddr::new(local, 0);

    let socket = Socket::new(
        Domain::for_address(bind_addr),
        Type::STREAM,
        Some(Protocol::TCP),
    )
    .map_err(|source| ConnectionError::SocketConfig {
        operation: "create",
        source,
    })?;

    socket
        .set_nonblocking(true)
        .map_err(|source| ConnectionError::SocketConfig {
            operation: "set_nonblocking",
            source,
        })?;

    allow_nonlocal_bind(&socket, local);

    socket
        .bind(&bind_addr.into())
        .map_err(|source| ConnectionError::Bind { local, source })?;

    Ok(TcpSocket::from_std_stream(std::net::TcpStream::from(socket)))
}

/// Let the socket bind addresses of subnets routed to this host without
/// assigning each address to an interface (AnyIP setups)
///
/// Best effort; a failure only matters if the address is not local.
#[cfg(target_os = "linux")]
fn allow_nonlocal_bind(socket: &Socket, local: IpAddr) {
    let result = match local {
        IpAddr::V4(_) => socket.set_freebind(true),
        IpAddr::V6(_) => socket.set_freebind_ipv6(true),
    };
    if let Err(e) = result {
        debug!("Failed to enable freebind for {}: {}", local, e);
    }
}

#[cfg(not(target_os = "linux"))]
fn allow_nonlocal_bind(_socket: &Socket, _local: IpAddr) {}

/// Hostname resolver that only yields addresses of one family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolver {
    family: Option<AddressFamily>,
}

impl Resolver {
    /// Resolver returning any family (system default behavior)
    #[must_use]
    pub const fn any_family() -> Self {
        Self { family: None }
    }

    /// Resolver returning only `family` addresses
    #[must_use]
    pub const fn for_family(family: AddressFamily) -> Self {
        Self {
            family: Some(family),
        }
    }

    #[must_use]
    pub const fn family(&self) -> Option<AddressFamily> {
        self.family
    }

    #[inline]
    fn accepts(&self, ip: IpAddr) -> bool {
        self.family.is_none_or(|family| family.matches(ip))
    }

    /// Resolve `host` to the first address of the permitted family
    ///
    /// IP literals are returned as-is when their family is permitted.
    ///
    /// # Errors
    /// - [`ConnectionError::DnsResolution`] if the lookup fails or returns nothing
    /// - [`ConnectionError::NoAddressForFamily`] if no result has the permitted family
    pub async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr, ConnectionError> {
        let candidates: Vec<SocketAddr> = match host.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, port)],
            Err(_) => tokio::net::lookup_host((host, port))
                .await
                .map_err(|source| ConnectionError::DnsResolution {
                    host: host.to_string(),
                    source,
                })?
                .collect(),
        };

        if let Some(addr) = candidates.iter().find(|addr| self.accepts(addr.ip())) {
            debug!(
                "Resolved {} to {} ({} candidates)",
                host,
                addr,
                candidates.len()
            );
            return Ok(*addr);
        }

        Err(match self.family {
            Some(family) if !candidates.is_empty() => ConnectionError::NoAddressForFamily {
                host: host.to_string(),
                family,
            },
            _ => ConnectionError::DnsResolution {
                host: host.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            },
        })
    }
}

/// Disable Nagle's algorithm on both legs of a relayed session
///
/// SOCKS traffic is often interactive; failures are logged and ignored.
pub fn set_nodelay(client: &TcpStream, outbound: &TcpStream) {
    for (side, stream) in [("client", client), ("outbound", outbound)] {
        if let Err(e) = SockRef::from(stream).set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY on {} socket: {}", side, e);
        }
    }
}
