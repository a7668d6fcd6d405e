//! Connection-request listener: lets the ACS wake the CPE out of cycle.
//!
//! A tiny hand-rolled HTTP server — no web framework, just a raw
//! `tokio::net` socket loop. Every accepted connection gets exactly one
//! `200 OK` response; the request line and headers are read and discarded,
//! since the ACS never sends a body the CPE needs to act on here.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::SessionEngine;

const CONNECTION_REQUEST_EVENT: &str = "6 CONNECTION REQUEST";

/// A bound, not-yet-accepting connection-request server.
pub struct ConnectionRequestServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ConnectionRequestServer {
    /// Learns the CPE's outbound-facing local IP via a throwaway TCP
    /// connection to the ACS host, then binds on that IP at
    /// `acs_port + port_offset`, unless `bind_address_override` names an
    /// address to bind on instead.
    pub async fn bind(acs_url: &str, port_offset: u16, bind_address_override: Option<&str>) -> Result<Self> {
        let (host, acs_port) = parse_authority(acs_url)?;

        let bind_ip = match bind_address_override {
            Some(addr) => addr.to_string(),
            None => {
                let probe = TcpStream::connect((host.as_str(), acs_port))
                    .await
                    .map_err(|e| Error::internal(format!("could not learn outbound IP (connect to {host}:{acs_port} failed): {e}")))?;
                probe.local_addr()?.ip().to_string()
            }
        };

        let bind_port = acs_port + port_offset;
        let listener = TcpListener::bind((bind_ip.as_str(), bind_port)).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "connection-request listener bound");
        Ok(Self { listener, local_addr })
    }

    /// The URL to advertise into `ManagementServer.ConnectionRequestURL`.
    pub fn url(&self) -> String {
        format!("http://{}/", self.local_addr)
    }

    /// Accepts connections forever. On each one: drop the socket if
    /// `acceptConnections` is false; otherwise respond `200` and either
    /// mark `pendingInform` (session already active) or cancel the
    /// periodic timer and start a session immediately.
    pub fn spawn(self, engine: Arc<SessionEngine>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let (socket, peer) = match self.listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "connection-request accept failed");
                        continue;
                    }
                };
                let engine = engine.clone();
                tokio::spawn(async move {
                    handle_connection(socket, peer, engine).await;
                });
            }
        })
    }
}

async fn handle_connection(mut socket: TcpStream, peer: SocketAddr, engine: Arc<SessionEngine>) {
    if !engine.state().read().await.accept_connections {
        debug!(%peer, "dropping connection-request: device not accepting connections");
        return;
    }

    // Drain (and discard) the request line/headers so the peer's write
    // doesn't stall on a full socket buffer before we reply.
    let mut buf = [0u8; 1024];
    let _ = socket.read(&mut buf).await;

    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    if let Err(e) = socket.write_all(response).await {
        warn!(%peer, error = %e, "failed to respond to connection-request");
        return;
    }
    let _ = socket.shutdown().await;

    let already_active = engine.state().read().await.is_session_active();
    if already_active {
        engine.state().write().await.pending_inform = true;
        debug!(%peer, "connection-request received mid-session; pendingInform set");
    } else {
        engine.cancel_scheduled().await;
        let _ = engine.trigger_sender().send(CONNECTION_REQUEST_EVENT.to_string());
        info!(%peer, "connection-request triggered an immediate session");
    }
}

/// Extracts `(host, port)` from an `http(s)://host[:port]/...` URL,
/// defaulting to 80/443 per scheme when no port is given.
fn parse_authority(url: &str) -> Result<(String, u16)> {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| Error::parse(format!("not an absolute URL: {url}")))?;
    let default_port = if url.starts_with("https://") { 443 } else { 80 };
    let authority = rest.split('/').next().unwrap_or(rest);
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| Error::parse(format!("invalid port in URL: {url}")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), default_port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_authority_extracts_host_and_explicit_port() {
        let (host, port) = parse_authority("http://acs.example.com:7547/acs").unwrap();
        assert_eq!(host, "acs.example.com");
        assert_eq!(port, 7547);
    }

    #[test]
    fn parse_authority_defaults_port_80_for_http() {
        let (host, port) = parse_authority("http://acs.example.com/acs").unwrap();
        assert_eq!(host, "acs.example.com");
        assert_eq!(port, 80);
    }

    #[test]
    fn parse_authority_rejects_relative_urls() {
        assert!(parse_authority("/acs").is_err());
    }
}
