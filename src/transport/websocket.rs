//! WebSocket client transport.
//!
//! Payloads map one-to-one onto data frames in both directions. Ping, pong
//! and raw frames are handled by the protocol layer and never surface as
//! payloads; a close frame ends the inbound sequence.

use super::{Connection, ConnectionId, PayloadReader, PayloadWriter, TransportError};
use crate::cli::Protocol;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound half of a WebSocket client
pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

/// Inbound half of a WebSocket client
pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

/// Open a WebSocket client connection to `url` (e.g. `ws://127.0.0.1:3001`)
pub async fn connect(url: &str, slot: ConnectionId) -> Result<Connection, TransportError> {
    debug!("Opening WebSocket connection {} to {}", slot, url);

    let (stream, _response) =
        tokio_tungstenite::connect_async(url)
            .await
            .map_err(|source| TransportError::Handshake {
                address: url.to_string(),
                source: Box::new(source),
            })?;
    let (sink, stream) = stream.split();

    Ok(Connection::new(
        slot,
        Protocol::WebSocket,
        Box::new(WebSocketWriter { sink }),
        Box::new(WebSocketReader { stream }),
    ))
}

/// Text payloads travel as text frames; anything that is not UTF-8 goes binary.
fn to_frame(payload: &[u8]) -> Message {
    match std::str::from_utf8(payload) {
        Ok(text) => Message::text(text.to_owned()),
        Err(_) => Message::binary(payload.to_vec()),
    }
}

#[async_trait]
impl PayloadWriter for WebSocketWriter {
    async fn write_payload(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.sink.send(to_frame(payload)).await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.sink.close().await?;
        Ok(())
    }
}

#[async_trait]
impl PayloadReader for WebSocketReader {
    async fn read_payload(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => return Ok(Some(text.as_str().as_bytes().to_vec())),
                Message::Binary(data) => return Ok(Some(data.to_vec())),
                Message::Close(reason) => {
                    debug!("WebSocket peer closed: {:?}", reason);
                    return Ok(None);
                }
                other => trace!("Skipping control frame: {:?}", other),
            }
        }
        Ok(None)
    }
}
