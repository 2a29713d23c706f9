// src/query/client.rs
use log::{debug, error};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

use crate::models::server::ServerAddress;

/// Every out-of-band packet starts with four 0xFF bytes.
pub const OOB_HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
pub const GETSTATUS_COMMAND: &[u8] = b"getstatus\n";
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Outcome of a single status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireResponse {
    Success(Vec<u8>),
    Timeout,
    /// Any network failure other than a read timeout
    NetworkError,
}

pub fn getstatus_packet() -> Vec<u8> {
    let mut packet = Vec::with_capacity(OOB_HEADER.len() + GETSTATUS_COMMAND.len());
    packet.extend_from_slice(&OOB_HEADER);
    packet.extend_from_slice(GETSTATUS_COMMAND);
    packet
}

#[derive(Debug, Clone)]
pub struct StatusClient {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl StatusClient {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    /// Sends one `getstatus` request and waits for one datagram. No retries.
    pub async fn query(&self, address: &ServerAddress) -> WireResponse {
        let socket = match timeout(self.connect_timeout, connect(address)).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => {
                error!(
                    "{} - Socket error - Error code: {} - Error message: {}",
                    address,
                    e.raw_os_error().unwrap_or(0),
                    e
                );
                return WireResponse::NetworkError;
            }
            Err(_) => {
                error!("{} - Socket error - Timed out while connecting", address);
                return WireResponse::NetworkError;
            }
        };

        if let Err(e) = socket.send(&getstatus_packet()).await {
            error!("{} - Could not write to the UDP socket: {}", address, e);
            return WireResponse::NetworkError;
        }

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        match timeout(self.read_timeout, socket.recv(&mut buffer)).await {
            Ok(Ok(0)) => {
                error!("{} - Received an empty datagram", address);
                WireResponse::NetworkError
            }
            Ok(Ok(len)) => {
                debug!("{} - Received {} bytes", address, len);
                buffer.truncate(len);
                WireResponse::Success(buffer)
            }
            Ok(Err(e)) => {
                error!("{} - Failed to read from the UDP socket: {}", address, e);
                WireResponse::NetworkError
            }
            Err(_) => WireResponse::Timeout,
        }
    }
}

async fn connect(address: &ServerAddress) -> io::Result<UdpSocket> {
    let target = lookup_host((address.host(), address.port()))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host name did not resolve"))?;

    let local = if target.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(target).await?;
    Ok(socket)
}
