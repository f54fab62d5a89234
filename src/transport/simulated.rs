//! In-process echo transport.
//!
//! Every payload written to a simulated connection is delivered straight back
//! to the same connection's receive loop. Connect failures, send failures and
//! peers that stop reading can be injected per slot, which makes the pool,
//! sender and session logic observable without any sockets.

use super::{
    Connection, ConnectionId, Connector, PayloadReader, PayloadWriter, TransportError,
    DEFAULT_WRITE_TIMEOUT,
};
use crate::targets::TargetSpec;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    refused_slots: HashSet<ConnectionId>,
    broken_slots: HashSet<ConnectionId>,
    stalled_slots: HashSet<ConnectionId>,
    write_timeout: Duration,
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self {
            refused_slots: HashSet::new(),
            broken_slots: HashSet::new(),
            stalled_slots: HashSet::new(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write timeout applied to every connection this connector opens
    pub fn write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Make the connection attempt for `slot` fail
    pub fn refuse_slot(mut self, slot: ConnectionId) -> Self {
        self.refused_slots.insert(slot);
        self
    }

    /// Make every send on `slot` fail once it is connected
    pub fn break_sends_on(mut self, slot: ConnectionId) -> Self {
        self.broken_slots.insert(slot);
        self
    }

    /// Make `slot` behave like a peer that stopped reading: sends and the
    /// shutdown on close never complete on their own
    pub fn stall_slot(mut self, slot: ConnectionId) -> Self {
        self.stalled_slots.insert(slot);
        self
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(
        &self,
        target: &TargetSpec,
        slot: ConnectionId,
    ) -> Result<Connection, TransportError> {
        if self.refused_slots.contains(&slot) {
            return Err(TransportError::Connect {
                address: target.address.clone(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "simulated refusal"),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(
            slot,
            target.protocol,
            Box::new(EchoWriter {
                tx: Some(tx),
                broken: self.broken_slots.contains(&slot),
                stalled: self.stalled_slots.contains(&slot),
            }),
            Box::new(EchoReader { rx }),
        );
        Ok(connection.with_write_timeout(self.write_timeout))
    }
}

struct EchoWriter {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    broken: bool,
    stalled: bool,
}

struct EchoReader {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl PayloadWriter for EchoWriter {
    async fn write_payload(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated send failure").into());
        }
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(payload.to_vec()).map_err(|_| TransportError::Closed)
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        self.tx = None;
        Ok(())
    }
}

#[async_trait]
impl PayloadReader for EchoReader {
    async fn read_payload(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Protocol;

    fn target() -> TargetSpec {
        TargetSpec::new("Simulated", "sim://echo", Protocol::Tcp)
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let connection = SimulatedConnector::new().connect(&target(), 0).await.unwrap();
        let mut receive_loop = connection.receive_loop().unwrap();

        connection.send(b"Hello World!").await.unwrap();
        assert_eq!(receive_loop.next().await, Some(b"Hello World!".to_vec()));
    }

    #[tokio::test]
    async fn test_refused_slot() {
        let connector = SimulatedConnector::new().refuse_slot(1);
        assert!(connector.connect(&target(), 0).await.is_ok());
        assert!(matches!(
            connector.connect(&target(), 1).await,
            Err(TransportError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn test_broken_slot_fails_every_send() {
        let connector = SimulatedConnector::new().break_sends_on(0);
        let connection = connector.connect(&target(), 0).await.unwrap();
        assert!(connection.send(b"a").await.is_err());
        assert!(connection.send(b"b").await.is_err());
    }

    #[tokio::test]
    async fn test_stalled_slot_times_out_sends() {
        let connector = SimulatedConnector::new()
            .stall_slot(0)
            .write_timeout(Duration::from_millis(20));
        let connection = connector.connect(&target(), 0).await.unwrap();

        assert!(matches!(
            connection.send(b"Hello World!").await,
            Err(TransportError::SendTimeout(_))
        ));
    }
}
