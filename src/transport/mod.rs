//! # Transport Abstraction Layer
//!
//! Every protocol under test is reduced to the same small capability set: open a
//! connection, send a payload, pull inbound payloads until the connection ends,
//! and close. The concrete framing (WebSocket frames, raw stream reads, single
//! datagrams) lives in the protocol submodules.
//!
//! A [`Connection`] is split into two halves so the periodic sender and the
//! per-connection receive loop never contend on the same lock:
//!
//! - **Write half**: a [`PayloadWriter`] behind an async mutex, used by the sender
//! - **Read half**: a [`PayloadReader`] handed out exactly once as a [`ReceiveLoop`]
//!
//! Closing a connection flips a `watch` signal that the receive loop observes
//! alongside its blocking read, so a runner parked on a silent socket still
//! terminates promptly.

use crate::cli::Protocol;
use crate::targets::TargetSpec;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite;
use tracing::debug;

pub mod simulated;
pub mod tcp_stream;
pub mod udp_datagram;
pub mod websocket;

pub use simulated::SimulatedConnector;

/// Slot index of a connection within its run's pool
pub type ConnectionId = usize;

/// Largest single read accepted from stream and datagram sockets
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Upper bound on a single send before it is reported as failed
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while opening or using a connection
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("websocket handshake with {address} failed: {source}")]
    Handshake {
        address: String,
        #[source]
        source: Box<tungstenite::Error>,
    },

    #[error("no socket address resolved for {0}")]
    Unresolved(String),

    #[error("connection is closed")]
    Closed,

    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        TransportError::WebSocket(Box::new(err))
    }
}

/// Outbound half of a connection
#[async_trait]
pub trait PayloadWriter: Send {
    /// Submit one payload to the peer
    async fn write_payload(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Release the outbound side of the transport
    async fn shutdown(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a connection
#[async_trait]
pub trait PayloadReader: Send {
    /// Wait for the next inbound payload.
    ///
    /// `Ok(None)` means the peer closed the connection in an orderly way.
    async fn read_payload(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Transport settings shared by every connection of a run
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Socket send/receive buffer size; `None` keeps the OS default
    pub buffer_size: Option<usize>,
    pub write_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            buffer_size: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// An open client connection bound to one pool slot
pub struct Connection {
    slot: ConnectionId,
    protocol: Protocol,
    writer: Mutex<Box<dyn PayloadWriter>>,
    reader: parking_lot::Mutex<Option<Box<dyn PayloadReader>>>,
    close_signal: watch::Sender<bool>,
    closed: AtomicBool,
    write_timeout: Duration,
}

impl Connection {
    pub fn new(
        slot: ConnectionId,
        protocol: Protocol,
        writer: Box<dyn PayloadWriter>,
        reader: Box<dyn PayloadReader>,
    ) -> Self {
        let (close_signal, _) = watch::channel(false);
        Self {
            slot,
            protocol,
            writer: Mutex::new(writer),
            reader: parking_lot::Mutex::new(Some(reader)),
            close_signal,
            closed: AtomicBool::new(false),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn slot(&self) -> ConnectionId {
        self.slot
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send one payload, bounded by the connection's write timeout
    pub async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut writer = self.writer.lock().await;
        match timeout(self.write_timeout, writer.write_payload(payload)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::SendTimeout(self.write_timeout)),
        }
    }

    /// Take the inbound payload sequence for this connection.
    ///
    /// The sequence can be taken once; later calls return `None`.
    pub fn receive_loop(&self) -> Option<ReceiveLoop> {
        let reader = self.reader.lock().take()?;
        Some(ReceiveLoop {
            reader,
            close_signal: self.close_signal.subscribe(),
            finished: false,
        })
    }

    /// Close the connection. Safe to call more than once; only the first call
    /// touches the transport, and its errors are swallowed.
    ///
    /// The receive loop is woken immediately. Shutting the transport down
    /// (including waiting for an in-flight send to release the writer) is
    /// bounded by the write timeout, so a peer that stopped reading cannot
    /// hold the caller.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.close_signal.send_replace(true);

        let shutdown = async {
            let mut writer = self.writer.lock().await;
            writer.shutdown().await
        };
        match timeout(self.write_timeout, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Ignoring close error on slot {}: {}", self.slot, e),
            Err(_) => debug!(
                "Ignoring close on slot {}: shutdown did not finish within {:?}",
                self.slot, self.write_timeout
            ),
        }
    }
}

/// Lazy, non-restartable sequence of inbound payloads for one connection
pub struct ReceiveLoop {
    reader: Box<dyn PayloadReader>,
    close_signal: watch::Receiver<bool>,
    finished: bool,
}

impl ReceiveLoop {
    /// Wait for the next payload; `None` once the connection is closed by either
    /// side or fails. After the first `None` every call returns `None`.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        if self.finished {
            return None;
        }

        let close_signal = &mut self.close_signal;
        let reader = &mut self.reader;
        let received = tokio::select! {
            biased;
            _ = async {
                let _ = close_signal.wait_for(|closed| *closed).await;
            } => None,
            read = reader.read_payload() => match read {
                Ok(payload) => payload,
                Err(e) => {
                    debug!("Receive loop ended: {}", e);
                    None
                }
            },
        };

        if received.is_none() {
            self.finished = true;
        }
        received
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Opens connections for a target
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        target: &TargetSpec,
        slot: ConnectionId,
    ) -> Result<Connection, TransportError>;
}

/// Connector that opens real sockets according to the target's protocol
#[derive(Debug, Clone, Default)]
pub struct NetworkConnector {
    config: TransportConfig,
}

impl NetworkConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for NetworkConnector {
    async fn connect(
        &self,
        target: &TargetSpec,
        slot: ConnectionId,
    ) -> Result<Connection, TransportError> {
        let connection = match target.protocol {
            Protocol::WebSocket => websocket::connect(&target.address, slot).await?,
            Protocol::Tcp => tcp_stream::connect(&target.address, slot, &self.config).await?,
            Protocol::Udp => udp_datagram::connect(&target.address, slot, &self.config).await?,
            Protocol::All => {
                return Err(TransportError::Unresolved(format!(
                    "'all' is not a concrete protocol for {}",
                    target.address
                )))
            }
        };
        Ok(connection.with_write_timeout(self.config.write_timeout))
    }
}

/// Resolve `address` to the first socket address the resolver returns
pub(crate) async fn resolve(address: &str) -> Result<std::net::SocketAddr, TransportError> {
    let mut addrs = tokio::net::lookup_host(address)
        .await
        .map_err(|source| TransportError::Connect {
            address: address.to_string(),
            source,
        })?;
    addrs
        .next()
        .ok_or_else(|| TransportError::Unresolved(address.to_string()))
}
