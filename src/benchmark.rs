//! # Benchmark Engine Module
//!
//! This module contains the run controller that drives one complete benchmark
//! cycle against a single target, and the sequencing of several targets into a
//! comparative result set.
//!
//! ## Run Lifecycle
//!
//! 1. **Connecting**: Open the configured number of connections one after the
//!    other. A failed attempt is logged and leaves its pool slot empty; every
//!    successful one immediately gets its own session task.
//! 2. **Running**: Start the periodic sender and wait out the observation
//!    window. There is no early exit.
//! 3. **Draining**: Stop the sender, close every live connection, and wait for
//!    the sessions to notice.
//! 4. **Reporting**: Read the counters once and produce a [`RunResult`].
//!
//! Runs are strictly sequential: the next target is not touched before the
//! previous run has reported, and a settle delay separates consecutive runs.

use crate::{
    cli::Args,
    pool::ConnectionPool,
    results::{ResultsManager, RunResult},
    sender::spawn_sender,
    session::{run_session, RunCounters},
    targets::TargetSpec,
    transport::{Connector, TransportConfig, DEFAULT_WRITE_TIMEOUT},
    utils::{format_duration, validate_clients, validate_duration, validate_duration_bound},
};
use anyhow::{ensure, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

/// A helper struct to provide a consistent, single source of truth for displaying
/// the per-target benchmark configuration.
struct BenchmarkConfigDisplay<'a> {
    config: &'a BenchmarkConfig,
    target: &'a TargetSpec,
}

impl<'a> std::fmt::Display for BenchmarkConfigDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting Benchmark for: {}", self.target.name)?;
        writeln!(f, "  Address:            {}", self.target.address)?;
        writeln!(f, "  Protocol:           {}", self.target.protocol)?;
        writeln!(f, "  Clients:            {}", self.config.clients)?;
        writeln!(
            f,
            "  Send Interval:      {}",
            format_duration(self.config.send_interval)
        )?;
        writeln!(
            f,
            "  Observation Window: {}",
            format_duration(self.config.observation_window)
        )?;
        writeln!(f, "  Messages per Tick:  {}", self.config.messages.len())?;
        let buffer_size_str = self
            .config
            .buffer_size
            .map_or("OS default".to_string(), |b| format!("{} bytes", b));
        writeln!(f, "  Buffer Size:        {}", buffer_size_str)?;
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Configuration for benchmark execution
///
/// One configuration drives every run of a benchmark session; only the target
/// changes between runs.
#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    /// Number of connection attempts per run (the slot count)
    pub clients: usize,

    /// Time between two sender ticks
    pub send_interval: Duration,

    /// How long the controller waits between starting the sender and draining
    pub observation_window: Duration,

    /// Pause between consecutive runs
    pub settle_delay: Duration,

    /// How long draining waits for the sender and sessions before aborting them
    pub stop_grace: Duration,

    /// Payloads submitted, in order, to every live slot on every tick
    pub messages: Vec<String>,

    /// Log every received payload
    pub log_messages: bool,

    /// Socket buffer size applied to stream and datagram sockets
    pub buffer_size: Option<usize>,

    /// Upper bound for a single send
    pub write_timeout: Duration,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            clients: crate::defaults::CLIENTS,
            send_interval: crate::defaults::SEND_INTERVAL,
            observation_window: crate::defaults::OBSERVATION_WINDOW,
            settle_delay: crate::defaults::SETTLE_DELAY,
            stop_grace: crate::defaults::STOP_GRACE,
            messages: crate::defaults::MESSAGES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            log_messages: false,
            buffer_size: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl BenchmarkConfig {
    /// Create benchmark configuration from CLI arguments.
    ///
    /// `log_messages` is passed in rather than read here so the environment is
    /// consulted exactly once, at process start.
    pub fn from_args(args: &Args, log_messages: bool) -> Result<Self> {
        let config = Self {
            clients: args.clients,
            send_interval: args.interval,
            observation_window: args.duration,
            settle_delay: args.settle,
            log_messages,
            buffer_size: args.buffer_size,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_clients(self.clients)?;
        validate_duration("send interval", self.send_interval)?;
        validate_duration("observation window", self.observation_window)?;
        validate_duration_bound("settle delay", self.settle_delay)?;
        ensure!(
            !self.messages.is_empty(),
            "At least one message must be configured"
        );
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            buffer_size: self.buffer_size,
            write_timeout: self.write_timeout,
        }
    }

    fn message_payloads(&self) -> Arc<[Vec<u8>]> {
        self.messages
            .iter()
            .map(|m| m.as_bytes().to_vec())
            .collect()
    }
}

/// Phases of a single run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Connecting,
    Running,
    Draining,
    Reporting,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Connecting => write!(f, "connecting"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::Draining => write!(f, "draining"),
            RunPhase::Reporting => write!(f, "reporting"),
        }
    }
}

/// Drives one benchmark cycle against one target
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    target: TargetSpec,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig, target: TargetSpec) -> Self {
        Self { config, target }
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    fn enter(&self, phase: RunPhase) {
        debug!("{}: entering {} phase", self.target.name, phase);
    }

    /// Run the full connect/run/drain/report cycle.
    ///
    /// Connection and send failures are absorbed into the result; the only
    /// error returned is an invalid configuration.
    pub async fn run(&self, connector: &dyn Connector) -> Result<RunResult> {
        self.config.validate()?;
        info!(
            "{}",
            BenchmarkConfigDisplay {
                config: &self.config,
                target: &self.target,
            }
        );
        info!(
            "Connecting to {} at {}",
            self.target.name, self.target.address
        );

        let counters = Arc::new(RunCounters::new());

        self.enter(RunPhase::Connecting);
        let (pool, sessions) = self.connect_pool(connector, &counters).await;
        let pool = Arc::new(pool);
        info!(
            "{}: {} of {} clients connected",
            self.target.name,
            pool.live_count(),
            pool.configured_slots()
        );

        self.enter(RunPhase::Running);
        let sender = spawn_sender(
            pool.clone(),
            self.config.message_payloads(),
            self.config.send_interval,
            counters.clone(),
        );
        sleep(self.config.observation_window).await;

        self.enter(RunPhase::Draining);
        let sender_stats = sender.stop(self.config.stop_grace).await;
        if let Some(stats) = sender_stats {
            debug!(
                "{}: sender ran {} ticks, {} sends attempted",
                self.target.name, stats.ticks, stats.attempted
            );
        }
        pool.close_all().await;
        let sessions_started = sessions.len();
        self.drain_sessions(sessions).await;

        self.enter(RunPhase::Reporting);
        let snapshot = counters.snapshot();
        info!(
            "{}: {} messages received",
            self.target.name, snapshot.received
        );

        Ok(RunResult::from_run(
            &self.target,
            snapshot,
            self.config.observation_window,
            pool.configured_slots(),
            pool.live_count(),
            sessions_started,
        ))
    }

    /// Attempt every slot in order, starting a session per live connection
    async fn connect_pool(
        &self,
        connector: &dyn Connector,
        counters: &Arc<RunCounters>,
    ) -> (ConnectionPool, Vec<JoinHandle<u64>>) {
        let mut pool = ConnectionPool::with_capacity(self.config.clients);
        let mut sessions = Vec::with_capacity(self.config.clients);

        for slot in 0..self.config.clients {
            match connector.connect(&self.target, slot).await {
                Ok(connection) => {
                    let connection = Arc::new(connection);
                    if let Some(receive_loop) = connection.receive_loop() {
                        sessions.push(tokio::spawn(run_session(
                            slot,
                            receive_loop,
                            counters.clone(),
                            self.config.log_messages,
                            self.target.protocol,
                        )));
                    }
                    pool.insert(connection);
                }
                Err(e) => {
                    warn!(
                        "Failed to connect to {} server: {}",
                        self.target.protocol, e
                    );
                    pool.mark_failed();
                }
            }
        }

        (pool, sessions)
    }

    /// Wait for sessions to observe their closed connections, aborting any
    /// that are still running when the grace period ends. Returns how many
    /// were aborted.
    async fn drain_sessions(&self, sessions: Vec<JoinHandle<u64>>) -> usize {
        let deadline = Instant::now() + self.config.stop_grace;
        let mut aborted = 0usize;

        for mut session in sessions {
            if timeout_at(deadline, &mut session).await.is_err() {
                session.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            warn!(
                "{}: aborted {} sessions that did not finish after close",
                self.target.name, aborted
            );
        }
        aborted
    }
}

/// Benchmark every target in order and collect their results.
///
/// `settle_delay` is observed between runs, never before the first one.
pub async fn run_targets(
    config: &BenchmarkConfig,
    targets: &[TargetSpec],
    connector: &dyn Connector,
) -> Result<ResultsManager> {
    let mut results_manager = ResultsManager::new();

    for (i, target) in targets.iter().enumerate() {
        if i > 0 {
            info!(
                "Waiting {} for resources to settle...",
                format_duration(config.settle_delay)
            );
            sleep(config.settle_delay).await;
        }

        let runner = BenchmarkRunner::new(config.clone(), target.clone());
        let result = runner.run(connector).await?;
        results_manager.add_result(result);
    }

    Ok(results_manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Protocol;
    use crate::transport::SimulatedConnector;

    fn fast_config(clients: usize) -> BenchmarkConfig {
        BenchmarkConfig {
            clients,
            send_interval: Duration::from_millis(10),
            observation_window: Duration::from_millis(120),
            settle_delay: Duration::from_millis(10),
            stop_grace: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.clients, 100);
        assert_eq!(config.send_interval, Duration::from_millis(64));
        assert_eq!(config.observation_window, Duration::from_secs(10));
        assert_eq!(config.settle_delay, Duration::from_secs(5));
        assert_eq!(
            config.messages,
            vec!["Hello World!", "Hello World! 1", "What is the meaning of life?"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_args() {
        let args = Args {
            clients: 7,
            interval: Duration::from_millis(5),
            buffer_size: Some(4096),
            ..Default::default()
        };
        let config = BenchmarkConfig::from_args(&args, true).unwrap();
        assert_eq!(config.clients, 7);
        assert_eq!(config.send_interval, Duration::from_millis(5));
        assert!(config.log_messages);
        assert_eq!(config.transport_config().buffer_size, Some(4096));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let args = Args {
            clients: 0,
            ..Default::default()
        };
        assert!(BenchmarkConfig::from_args(&args, false).is_err());

        let config = BenchmarkConfig {
            messages: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BenchmarkConfig {
            send_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let args = Args {
            interval: Duration::from_millis(u64::MAX),
            ..Default::default()
        };
        assert!(BenchmarkConfig::from_args(&args, false).is_err());

        let args = Args {
            settle: Duration::from_millis(u64::MAX),
            ..Default::default()
        };
        assert!(BenchmarkConfig::from_args(&args, false).is_err());
    }

    #[test]
    fn test_run_phase_display() {
        assert_eq!(RunPhase::Connecting.to_string(), "connecting");
        assert_eq!(RunPhase::Reporting.to_string(), "reporting");
    }

    #[tokio::test]
    async fn test_run_counts_echoed_messages() {
        let target = TargetSpec::new("Simulated TCP", "sim://tcp", Protocol::Tcp);
        let runner = BenchmarkRunner::new(fast_config(4), target);

        let result = runner.run(&SimulatedConnector::new()).await.unwrap();

        assert_eq!(result.configured_clients, 4);
        assert_eq!(result.live_connections, 4);
        assert_eq!(result.sessions_started, 4);
        assert_eq!(result.lost_packets, 0);
        assert!(result.average > 0.0);
    }

    #[tokio::test]
    async fn test_run_with_no_connections_reports_zero() {
        let target = TargetSpec::new("Unreachable", "sim://down", Protocol::Udp);
        let connector = SimulatedConnector::new().refuse_slot(0).refuse_slot(1);
        let runner = BenchmarkRunner::new(fast_config(2), target);

        let result = runner.run(&connector).await.unwrap();

        assert_eq!(result.live_connections, 0);
        assert_eq!(result.sessions_started, 0);
        assert_eq!(result.average, 0.0);
        assert_eq!(result.lost_packets, 0);
    }

    #[tokio::test]
    async fn test_run_targets_is_sequential_and_ordered() {
        let targets = vec![
            TargetSpec::new("First", "sim://1", Protocol::WebSocket),
            TargetSpec::new("Second", "sim://2", Protocol::Tcp),
        ];
        let manager = run_targets(&fast_config(2), &targets, &SimulatedConnector::new())
            .await
            .unwrap();

        let names: Vec<_> = manager.results().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_on_spawned_task() {
        let target = TargetSpec::new("Simulated WS", "sim://ws", Protocol::WebSocket);
        let runner = BenchmarkRunner::new(fast_config(3), target);

        let result = tokio::spawn(async move {
            let connector = SimulatedConnector::new();
            runner.run(&connector).await
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(result.live_connections, 3);
        assert!(result.average > 0.0);
    }

    #[tokio::test]
    async fn test_drain_aborts_sessions_that_never_finish() {
        let config = BenchmarkConfig {
            stop_grace: Duration::from_millis(50),
            ..fast_config(2)
        };
        let runner = BenchmarkRunner::new(
            config,
            TargetSpec::new("Stuck", "sim://stuck", Protocol::Tcp),
        );
        let sessions = vec![
            tokio::spawn(async { 7u64 }),
            tokio::spawn(std::future::pending::<u64>()),
        ];

        let started = Instant::now();
        assert_eq!(runner.drain_sessions(sessions).await, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_run_with_stalled_peer_still_reports() {
        let target = TargetSpec::new("Stalled", "sim://stalled", Protocol::WebSocket);
        let config = BenchmarkConfig {
            stop_grace: Duration::from_millis(100),
            ..fast_config(3)
        };
        let connector = SimulatedConnector::new()
            .stall_slot(1)
            .write_timeout(Duration::from_millis(50));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            BenchmarkRunner::new(config, target).run(&connector),
        )
        .await
        .expect("draining did not finish")
        .unwrap();

        assert_eq!(result.live_connections, 3);
        assert_eq!(result.sessions_started, 3);
        assert!(result.lost_packets > 0);
        assert!(result.average > 0.0);
    }
}
