//! # Periodic Sender
//!
//! One sender task per run. On every tick it walks the configured slots in
//! order and submits the full message list over each live connection. Empty
//! slots are skipped without counting anything; each failed submission counts
//! exactly one lost packet. Failed sends are never retried.
//!
//! Stopping is cooperative: the stop signal is only observed between ticks,
//! so a tick that has started always runs to completion (bounded by the
//! connections' write timeout). [`SenderHandle::stop`] aborts the task if it
//! does not wind down within the given grace period.

use crate::pool::ConnectionPool;
use crate::session::RunCounters;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Work done by a sender over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderStats {
    pub ticks: u64,
    pub attempted: u64,
    /// Submissions not attempted because their slot had no connection
    pub skipped: u64,
}

/// Running sender task and its stop signal
pub struct SenderHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<SenderStats>,
}

impl SenderHandle {
    /// Suppress future ticks and wait up to `grace` for the task to finish
    pub async fn stop(mut self, grace: Duration) -> Option<SenderStats> {
        self.stop.send_replace(true);

        match timeout(grace, &mut self.task).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                warn!("Sender task failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Sender did not stop within {:?}, aborting it", grace);
                self.task.abort();
                None
            }
        }
    }
}

/// Start the periodic sender for a run. The first tick fires one `interval`
/// after this call.
pub fn spawn_sender(
    pool: Arc<ConnectionPool>,
    messages: Arc<[Vec<u8>]>,
    interval: Duration,
    counters: Arc<RunCounters>,
) -> SenderHandle {
    let (stop, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut stats = SenderStats::default();
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = async {
                    let _ = stop_rx.wait_for(|stopped| *stopped).await;
                } => break,
                _ = ticker.tick() => {
                    send_tick(&pool, &messages, &counters, &mut stats).await;
                }
            }
        }

        debug!(
            "Sender stopped after {} ticks ({} attempted, {} skipped)",
            stats.ticks, stats.attempted, stats.skipped
        );
        stats
    });

    SenderHandle { stop, task }
}

/// One pass over every configured slot and every message
pub async fn send_tick(
    pool: &ConnectionPool,
    messages: &[Vec<u8>],
    counters: &RunCounters,
    stats: &mut SenderStats,
) {
    stats.ticks += 1;

    for slot in 0..pool.configured_slots() {
        let Some(connection) = pool.get(slot) else {
            stats.skipped += messages.len() as u64;
            continue;
        };

        for message in messages {
            stats.attempted += 1;
            if let Err(e) = connection.send(message).await {
                trace!("Send on slot {} failed: {}", slot, e);
                counters.record_lost();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Protocol;
    use crate::targets::TargetSpec;
    use crate::transport::{Connector, SimulatedConnector};

    fn messages() -> Arc<[Vec<u8>]> {
        crate::defaults::MESSAGES
            .iter()
            .map(|m| m.as_bytes().to_vec())
            .collect()
    }

    async fn build_pool(connector: &SimulatedConnector, clients: usize) -> ConnectionPool {
        let target = TargetSpec::new("Simulated", "sim://echo", Protocol::Tcp);
        let mut pool = ConnectionPool::with_capacity(clients);
        for slot in 0..clients {
            match connector.connect(&target, slot).await {
                Ok(connection) => {
                    pool.insert(Arc::new(connection));
                }
                Err(_) => {
                    pool.mark_failed();
                }
            }
        }
        pool
    }

    #[tokio::test]
    async fn test_empty_slots_are_skipped_not_lost() {
        let pool = build_pool(&SimulatedConnector::new().refuse_slot(1), 3).await;
        let counters = RunCounters::new();
        let mut stats = SenderStats::default();

        send_tick(&pool, &messages(), &counters, &mut stats).await;

        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.attempted, 6);
        assert_eq!(stats.skipped, 3);
        assert_eq!(counters.snapshot().lost, 0);
    }

    #[tokio::test]
    async fn test_each_failed_send_counts_once() {
        let pool = build_pool(&SimulatedConnector::new().break_sends_on(2), 3).await;
        let counters = RunCounters::new();
        let mut stats = SenderStats::default();

        send_tick(&pool, &messages(), &counters, &mut stats).await;
        send_tick(&pool, &messages(), &counters, &mut stats).await;

        assert_eq!(stats.attempted, 18);
        assert_eq!(counters.snapshot().lost, 6);
    }

    #[tokio::test]
    async fn test_sender_ticks_until_stopped() {
        let pool = Arc::new(build_pool(&SimulatedConnector::new(), 2).await);
        let counters = Arc::new(RunCounters::new());

        let handle = spawn_sender(pool, messages(), Duration::from_millis(10), counters.clone());
        tokio::time::sleep(Duration::from_millis(105)).await;
        let stats = handle.stop(Duration::from_secs(1)).await.unwrap();

        assert!(stats.ticks >= 5, "expected several ticks, got {}", stats.ticks);
        assert_eq!(stats.attempted, stats.ticks * 6);
        assert_eq!(counters.snapshot().lost, 0);
    }

    #[tokio::test]
    async fn test_first_tick_waits_one_interval() {
        let pool = Arc::new(build_pool(&SimulatedConnector::new(), 1).await);
        let counters = Arc::new(RunCounters::new());

        let handle = spawn_sender(pool, messages(), Duration::from_secs(60), counters);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stats = handle.stop(Duration::from_secs(1)).await.unwrap();

        assert_eq!(stats.ticks, 0);
    }

    #[tokio::test]
    async fn test_timed_out_sends_count_once_per_payload() {
        let connector = SimulatedConnector::new()
            .stall_slot(1)
            .write_timeout(Duration::from_millis(10));
        let pool = build_pool(&connector, 2).await;
        let counters = RunCounters::new();
        let mut stats = SenderStats::default();

        send_tick(&pool, &messages(), &counters, &mut stats).await;

        assert_eq!(stats.attempted, 6);
        assert_eq!(counters.snapshot().lost, 3);
    }

    #[tokio::test]
    async fn test_stop_aborts_sender_stuck_in_a_tick() {
        let connector = SimulatedConnector::new()
            .stall_slot(0)
            .write_timeout(Duration::from_secs(30));
        let pool = Arc::new(build_pool(&connector, 1).await);
        let counters = Arc::new(RunCounters::new());

        let handle = spawn_sender(pool.clone(), messages(), Duration::from_millis(5), counters);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let started = Instant::now();
        assert!(handle.stop(Duration::from_millis(50)).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));

        // The aborted task releases its share of the pool.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(Arc::strong_count(&pool), 1);
    }
}
