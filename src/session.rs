//! # Session Runner and Run Counters
//!
//! Each successfully opened connection gets one session: a task that drains the
//! connection's receive loop and bumps the run's received counter once per
//! inbound payload. Sessions are never restarted; a read error or a closed
//! connection ends them for the rest of the run.
//!
//! The counters are the only state shared between the sessions, the sender and
//! the controller of a run. They are plain atomics owned by a per-run
//! [`RunCounters`] context, so two runs never share a counter.

use crate::cli::Protocol;
use crate::transport::{ConnectionId, ReceiveLoop};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Received/lost counters for a single run
#[derive(Debug, Default)]
pub struct RunCounters {
    received: AtomicU64,
    lost: AtomicU64,
}

/// Point-in-time copy of a run's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub received: u64,
    pub lost: u64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lost(&self) {
        self.lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.load(Ordering::Acquire),
            lost: self.lost.load(Ordering::Acquire),
        }
    }
}

/// Drain one connection's inbound payloads until it closes or fails.
///
/// Returns how many payloads this session observed.
pub async fn run_session(
    slot: ConnectionId,
    mut receive_loop: ReceiveLoop,
    counters: Arc<RunCounters>,
    log_messages: bool,
    protocol: Protocol,
) -> u64 {
    let mut observed = 0u64;

    while let Some(payload) = receive_loop.next().await {
        if log_messages {
            info!("{} received: {}", protocol, String::from_utf8_lossy(&payload));
        }
        counters.record_received();
        observed += 1;
    }

    debug!("Session {} finished after {} payloads", slot, observed);
    observed
}
