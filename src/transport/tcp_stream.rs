//! Raw TCP client transport.

use super::{
    resolve, Connection, ConnectionId, PayloadReader, PayloadWriter, TransportConfig,
    TransportError, RECEIVE_BUFFER_SIZE,
};
use crate::cli::Protocol;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Outbound half of a raw TCP client
pub struct TcpWriter {
    half: OwnedWriteHalf,
}

/// Inbound half of a raw TCP client.
///
/// There is no framing on the wire: every successful read of up to
/// [`RECEIVE_BUFFER_SIZE`] bytes counts as one inbound payload.
pub struct TcpReader {
    half: OwnedReadHalf,
    buffer: Vec<u8>,
}

/// Open a TCP client connection to `address` (`host:port`)
pub async fn connect(
    address: &str,
    slot: ConnectionId,
    config: &TransportConfig,
) -> Result<Connection, TransportError> {
    debug!("Opening TCP connection {} to {}", slot, address);

    let addr = resolve(address).await?;
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect {
            address: address.to_string(),
            source,
        })?;

    // Configure socket options for low latency
    let socket = socket2::SockRef::from(&stream);
    socket.set_nodelay(true)?;
    if let Some(buffer_size) = config.buffer_size {
        socket.set_recv_buffer_size(buffer_size)?;
        socket.set_send_buffer_size(buffer_size)?;
    }

    let (read_half, write_half) = stream.into_split();

    Ok(Connection::new(
        slot,
        Protocol::Tcp,
        Box::new(TcpWriter { half: write_half }),
        Box::new(TcpReader {
            half: read_half,
            buffer: vec![0u8; RECEIVE_BUFFER_SIZE],
        }),
    ))
}

#[async_trait]
impl PayloadWriter for TcpWriter {
    async fn write_payload(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.half.write_all(payload).await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.half.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl PayloadReader for TcpReader {
    async fn read_payload(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let n = self.half.read(&mut self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buffer[..n].to_vec()))
    }
}
