//! Per-client session handling
//!
//! A session runs: client address resolution (socket peer or PROXY header),
//! egress routing, SOCKS5 handshake with the bound outbound dial, then the
//! byte relay.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::formatting::{format_bytes, format_elapsed, short_id};
use crate::network::set_nodelay;
use crate::protocol::proxy_header::{ProxyHeaderError, has_proxy_header, read_proxy_header};
use crate::protocol::socks5::{self, Destination, Socks5Error, TransferStats};
use crate::router::EgressPlan;
use crate::types::ClientId;

use super::SubnetProxy;

/// Why a client session ended early
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("client address unavailable: {0}")]
    PeerAddress(#[source] io::Error),

    #[error("PROXY header not received within {0:?}")]
    ProxyHeaderTimeout(Duration),

    #[error("invalid PROXY header: {0}")]
    ProxyHeader(#[from] ProxyHeaderError),

    #[error("SOCKS5 session failed: {0}")]
    Socks5(#[from] Socks5Error),

    #[error("relay failed: {0}")]
    Relay(#[source] io::Error),
}

fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}

impl SessionError {
    /// Get the appropriate log level for this error
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        match self {
            Self::PeerAddress(_) => tracing::Level::DEBUG,
            Self::ProxyHeader(ProxyHeaderError::Io(e)) | Self::Relay(e)
                if is_disconnect(e.kind()) =>
            {
                tracing::Level::DEBUG
            }
            Self::Socks5(e) => e.log_level(),
            _ => tracing::Level::WARN,
        }
    }
}

/// Log a failed session at the error's level
pub(super) fn log_session_error(peer: SocketAddr, err: &SessionError) {
    match err.log_level() {
        tracing::Level::ERROR => tracing::error!("Session from {} failed: {}", peer, err),
        tracing::Level::WARN => warn!("Session from {} failed: {}", peer, err),
        _ => debug!("Session from {} ended: {}", peer, err),
    }
}

/// Outcome of a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Client address used for routing (after any PROXY header)
    pub client: SocketAddr,
    pub egress: EgressPlan,
    pub destination: Destination,
    pub transfer: TransferStats,
    pub elapsed: Duration,
}

impl SubnetProxy {
    #[inline]
    fn increment_active_clients(&self) {
        self.active_clients.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn decrement_active_clients(&self) {
        self.active_clients.fetch_sub(1, Ordering::Relaxed);
    }

    /// Determine the client address: the PROXY header's source when enabled
    /// and present, otherwise the socket peer
    ///
    /// A connection without a signature is served as-is; one that opens with
    /// a signature must carry a well-formed header.
    async fn resolve_client_addr(
        &self,
        stream: &mut TcpStream,
        peer: SocketAddr,
    ) -> Result<SocketAddr, SessionError> {
        if !self.proxy_protocol {
            return Ok(peer);
        }

        let read_header = async {
            if !has_proxy_header(stream).await? {
                return Ok::<_, ProxyHeaderError>(None);
            }
            read_proxy_header(stream).await.map(Some)
        };
        let header = tokio::time::timeout(self.handshake_timeout, read_header)
            .await
            .map_err(|_| SessionError::ProxyHeaderTimeout(self.handshake_timeout))??;

        let Some(header) = header else {
            debug!("No PROXY header from {}, using socket address", peer);
            return Ok(peer);
        };
        debug!("PROXY header from {}: {:?}", peer, header);
        Ok(header.client_addr(peer))
    }

    fn log_session_completion(&self, id: &ClientId, summary: &SessionSummary) {
        debug!(
            "Session {} [{}] {} -> {} ↑{} ↓{} in {}",
            summary.client,
            short_id(id),
            summary.egress,
            summary.destination,
            format_bytes(summary.transfer.client_to_target),
            format_bytes(summary.transfer.target_to_client),
            format_elapsed(summary.elapsed)
        );
    }

    /// Serve one client connection to completion
    ///
    /// # Errors
    /// The [`SessionError`] that ended the session; the connection is closed
    /// when the stream is dropped.
    pub async fn handle_client(
        &self,
        mut client_stream: TcpStream,
    ) -> Result<SessionSummary, SessionError> {
        let peer = client_stream.peer_addr().map_err(SessionError::PeerAddress)?;
        let id = ClientId::new();
        debug!("New client connection from {} [{}]", peer, short_id(&id));

        self.increment_active_clients();

        let result = async {
            let client = self.resolve_client_addr(&mut client_stream, peer).await?;

            let egress = self.router.route(client.ip());
            info!("{} --({})-> outbound", client.ip(), egress);

            let (mut outbound, destination) =
                socks5::handshake(&mut client_stream, &egress, self.handshake_timeout).await?;
            set_nodelay(&client_stream, &outbound);

            let started = Instant::now();
            let transfer = socks5::relay(&mut client_stream, &mut outbound)
                .await
                .map_err(SessionError::Relay)?;

            let summary = SessionSummary {
                client,
                egress,
                destination,
                transfer,
                elapsed: started.elapsed(),
            };
            self.log_session_completion(&id, &summary);
            Ok(summary)
        }
        .await;

        self.decrement_active_clients();
        result
    }
}
