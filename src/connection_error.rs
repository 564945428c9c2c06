//! Connection error types for outbound dialing
//!
//! This module provides detailed error types for the egress path,
//! making it easier to diagnose and handle different failure scenarios.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};

use crate::network::AddressFamily;

/// Errors that can occur while dialing a destination for a client
#[derive(Debug)]
#[non_exhaustive]
pub enum ConnectionError {
    /// TCP connection to the destination failed
    TcpConnect {
        destination: SocketAddr,
        local: Option<IpAddr>,
        source: io::Error,
    },

    /// Binding the selected egress address failed
    Bind { local: IpAddr, source: io::Error },

    /// DNS resolution failed
    DnsResolution { host: String, source: io::Error },

    /// Host resolved, but not to any address of the egress family
    NoAddressForFamily {
        host: String,
        family: AddressFamily,
    },

    /// Destination literal does not match the egress address family
    FamilyMismatch {
        local: IpAddr,
        destination: SocketAddr,
    },

    /// Socket creation or configuration failed
    SocketConfig {
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TcpConnect {
                destination,
                local: Some(local),
                source,
            } => write!(
                f,
                "Failed to connect to {} from {}: {}",
                destination, local, source
            ),
            Self::TcpConnect {
                destination,
                local: None,
                source,
            } => write!(f, "Failed to connect to {}: {}", destination, source),
            Self::Bind { local, source } => {
                write!(f, "Failed to bind egress address {}: {}", local, source)
            }
            Self::DnsResolution { host, source } => {
                write!(f, "Failed to resolve DNS for {}: {}", host, source)
            }
            Self::NoAddressForFamily { host, family } => {
                write!(f, "No {} address found for {}", family, host)
            }
            Self::FamilyMismatch { local, destination } => write!(
                f,
                "Destination {} does not match egress address family of {}",
                destination, local
            ),
            Self::SocketConfig { operation, source } => {
                write!(f, "Failed to configure socket ({}): {}", operation, source)
            }
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TcpConnect { source, .. } => Some(source),
            Self::Bind { source, .. } => Some(source),
            Self::DnsResolution { source, .. } => Some(source),
            Self::SocketConfig { source, .. } => Some(source),
            Self::NoAddressForFamily { .. } | Self::FamilyMismatch { .. } => None,
        }
    }
}

impl ConnectionError {
    /// Kind of the underlying I/O error, if any
    #[must_use]
    pub fn io_error_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::TcpConnect { source, .. }
            | Self::Bind { source, .. }
            | Self::DnsResolution { source, .. }
            | Self::SocketConfig { source, .. } => Some(source.kind()),
            Self::NoAddressForFamily { .. } | Self::FamilyMismatch { .. } => None,
        }
    }

    /// Get the appropriate log level for this error
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        match self {
            // A pool address that cannot be bound is a host configuration problem
            Self::Bind { .. } | Self::SocketConfig { .. } => tracing::Level::ERROR,
            // Destination-side failures might be transient
            _ => tracing::Level::WARN,
        }
    }
}
