//! Test helpers for integration tests
//!
//! Reusable pieces for driving the proxy over real loopback sockets:
//! a target server that reports the address it saw, a proxy spawner, and a
//! minimal SOCKS5 client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use subnet_proxy::{Config, SubnetProxy};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Spawn a target server that writes the connecting peer's IP followed by
/// `\n`, then echoes everything it receives
///
/// # Returns
/// The listening address and the handle of the accept loop
pub async fn spawn_peer_reporting_server(bind: &str) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        while let Ok((mut stream, peer)) = listener.accept().await {
            tokio::spawn(async move {
                let line = format!("{}\n", peer.ip());
                if stream.write_all(line.as_bytes()).await.is_err() {
                    return;
                }

                let mut buffer = [0u8; 1024];
                loop {
                    match stream.read(&mut buffer).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buffer[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    Ok((addr, handle))
}

/// A proxy serving on an ephemeral loopback port
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub proxy: Arc<SubnetProxy>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl RunningProxy {
    /// Stop the accept loop and wait for it to return
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await?
    }
}

/// Spawn a proxy for `config` on `127.0.0.1:0`
pub async fn spawn_proxy(config: &Config) -> Result<RunningProxy> {
    spawn_proxy_instance(SubnetProxy::new(config)?).await
}

/// Serve an already-built proxy on `127.0.0.1:0`
pub async fn spawn_proxy_instance(proxy: SubnetProxy) -> Result<RunningProxy> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let proxy = Arc::new(proxy);
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(Arc::clone(&proxy).serve(listener, async move {
        let _ = rx.await;
    }));

    Ok(RunningProxy {
        addr,
        proxy,
        shutdown: Some(tx),
        handle,
    })
}

/// Address part of a SOCKS5 CONNECT request
pub enum Target<'a> {
    Addr(SocketAddr),
    Domain(&'a str, u16),
}

impl Target<'_> {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Target::Addr(SocketAddr::V4(v4)) => {
                out.push(0x01);
                out.extend_from_slice(&v4.ip().octets());
                out.extend_from_slice(&v4.port().to_be_bytes());
            }
            Target::Addr(SocketAddr::V6(v6)) => {
                out.push(0x04);
                out.extend_from_slice(&v6.ip().octets());
                out.extend_from_slice(&v6.port().to_be_bytes());
            }
            Target::Domain(host, port) => {
                out.push(0x03);
                out.push(host.len() as u8);
                out.extend_from_slice(host.as_bytes());
                out.extend_from_slice(&port.to_be_bytes());
            }
        }
        out
    }
}

/// Result of a SOCKS5 CONNECT
pub struct SocksReply {
    /// Reply code (0x00 on success)
    pub code: u8,
    /// Bound address from the reply
    pub bound: SocketAddr,
}

/// Send greeting and CONNECT over `stream`, read the method choice and reply
pub async fn socks5_connect(stream: &mut TcpStream, target: Target<'_>) -> Result<SocksReply> {
    stream.write_all(&[0x05, 0x01, 0x00]).await?;
    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await?;
    anyhow::ensure!(method == [0x05, 0x00], "unexpected method reply {:?}", method);

    let mut request = vec![0x05, 0x01, 0x00];
    request.extend(target.encode());
    stream.write_all(&request).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    anyhow::ensure!(head[0] == 0x05, "unexpected reply version {}", head[0]);

    let bound = match head[3] {
        0x01 => {
            let mut buf = [0u8; 6];
            stream.read_exact(&mut buf).await?;
            let ip = std::net::Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            SocketAddr::new(ip.into(), u16::from_be_bytes([buf[4], buf[5]]))
        }
        0x04 => {
            let mut buf = [0u8; 18];
            stream.read_exact(&mut buf).await?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            let ip = std::net::Ipv6Addr::from(octets);
            SocketAddr::new(ip.into(), u16::from_be_bytes([buf[16], buf[17]]))
        }
        other => anyhow::bail!("unexpected reply address type {}", other),
    };

    Ok(SocksReply {
        code: head[1],
        bound,
    })
}

/// Read one `\n`-terminated line byte by byte
pub async fn read_line(stream: &mut TcpStream) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await?;
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    Ok(String::from_utf8(line)?)
}

/// Config with `subnets` as the egress pool
pub fn config_with_pool(subnets: &[&str]) -> Config {
    let mut config = Config::default();
    config.pool.subnets = subnets.iter().map(|s| s.to_string()).collect();
    config
}
