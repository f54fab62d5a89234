//! Connected UDP socket transport; one datagram in either direction is one
//! payload.

use super::{
    resolve, Connection, ConnectionId, PayloadReader, PayloadWriter, TransportConfig,
    TransportError, RECEIVE_BUFFER_SIZE,
};
use crate::cli::Protocol;
use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::debug;

/// Outbound half of a connected UDP socket
pub struct UdpWriter {
    socket: Arc<UdpSocket>,
}

/// Inbound half of a connected UDP socket; one datagram is one payload.
///
/// Datagram sockets have no orderly close, so this sequence only ends on a
/// socket error or when the owning connection is closed.
pub struct UdpReader {
    socket: Arc<UdpSocket>,
    buffer: Vec<u8>,
}

/// Open a connected UDP socket towards `address` (`host:port`)
pub async fn connect(
    address: &str,
    slot: ConnectionId,
    config: &TransportConfig,
) -> Result<Connection, TransportError> {
    debug!("Opening UDP socket {} to {}", slot, address);

    let peer = resolve(address).await?;
    let local = if peer.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };

    let connect_error = |source: std::io::Error| TransportError::Connect {
        address: address.to_string(),
        source,
    };
    let socket = UdpSocket::bind(local).await.map_err(connect_error)?;
    socket.connect(peer).await.map_err(connect_error)?;

    if let Some(buffer_size) = config.buffer_size {
        let sock_ref = socket2::SockRef::from(&socket);
        sock_ref.set_recv_buffer_size(buffer_size)?;
        sock_ref.set_send_buffer_size(buffer_size)?;
    }

    let socket = Arc::new(socket);
    Ok(Connection::new(
        slot,
        Protocol::Udp,
        Box::new(UdpWriter {
            socket: socket.clone(),
        }),
        Box::new(UdpReader {
            socket,
            buffer: vec![0u8; RECEIVE_BUFFER_SIZE],
        }),
    ))
}

#[async_trait]
impl PayloadWriter for UdpWriter {
    async fn write_payload(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.socket.send(payload).await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        // Nothing to flush; the socket is released when both halves drop.
        Ok(())
    }
}

#[async_trait]
impl PayloadReader for UdpReader {
    async fn read_payload(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let n = self.socket.recv(&mut self.buffer).await?;
        Ok(Some(self.buffer[..n].to_vec()))
    }
}
