//! Connection arena for one run, indexed by connection attempt.

use crate::transport::{Connection, ConnectionId};
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// Fixed-capacity arena of connections for one run.
///
/// Slot `i` always corresponds to connection attempt `i`; an attempt that
/// failed leaves an explicit empty entry, so indices stay stable and the
/// number of slots always equals the configured client count once the
/// connecting phase is over.
#[derive(Default)]
pub struct ConnectionPool {
    slots: Vec<Option<Arc<Connection>>>,
}

impl ConnectionPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Record a successful attempt in the next slot and return its index
    pub fn insert(&mut self, connection: Arc<Connection>) -> ConnectionId {
        self.slots.push(Some(connection));
        self.slots.len() - 1
    }

    /// Record a failed attempt in the next slot and return its index
    pub fn mark_failed(&mut self) -> ConnectionId {
        self.slots.push(None);
        self.slots.len() - 1
    }

    pub fn get(&self, slot: ConnectionId) -> Option<&Arc<Connection>> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Number of attempted slots, live or empty
    pub fn configured_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn live(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.slots.iter().flatten()
    }

    /// Close every live connection concurrently; close errors are ignored.
    ///
    /// Finishes within one write timeout however many peers have stalled.
    pub async fn close_all(&self) {
        join_all(self.live().map(|connection| connection.close())).await;
        debug!("Closed {} pooled connections", self.live_count());
    }
}
