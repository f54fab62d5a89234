//! # Load Generation Benchmark Library
//!
//! A multi-protocol load-generation and measurement harness. For every target
//! server it opens a pool of concurrent client connections, sends a fixed set of
//! payloads from every connection at a steady cadence, counts what comes back
//! and what failed to go out, and finally compares the servers against each
//! other.
//!
//! ## Supported Transports
//!
//! - **WebSocket**: message-framed connections (`ws://` URLs)
//! - **TCP**: raw stream sockets, one inbound payload per read
//! - **UDP**: raw datagram sockets, one inbound payload per datagram
//!
//! ## Architecture Overview
//!
//! - `transport`: connection abstraction and the protocol implementations
//! - `session`: per-connection receive loops and the per-run counters
//! - `pool`: fixed-capacity connection arena with stable slot indices
//! - `sender`: the periodic driver that submits payloads to every slot
//! - `benchmark`: the run controller and target sequencing
//! - `results`: aggregation, ranking and report rendering
//! - `cli`, `targets`, `logging`, `utils`: the surrounding application shell
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use loadgen_benchmark::{run_targets, BenchmarkConfig, NetworkConnector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BenchmarkConfig::default();
//!     let connector = NetworkConnector::new(config.transport_config());
//!     let targets = loadgen_benchmark::targets::default_targets();
//!
//!     let mut results = run_targets(&config, &targets, &connector).await?;
//!     results.finalize()?;
//!     print!("{}", results.render_text());
//!     Ok(())
//! }
//! ```

/// Run controller and target sequencing
///
/// Owns the connect/run/drain/report lifecycle of a single run and the
/// strictly sequential execution of several runs.
pub mod benchmark;

/// Command-line interface and start-up configuration
pub mod cli;

/// Colorized log formatting and subscriber set-up
pub mod logging;

/// Connection pool for a single run
pub mod pool;

/// Result aggregation and report rendering
pub mod results;

/// Periodic sender
pub mod sender;

/// Session runners and shared run counters
pub mod session;

/// Compiled-in target list
pub mod targets;

/// Connection abstraction and transport implementations
///
/// Contains the `Connection` type, the `Connector` trait, and the WebSocket,
/// TCP, UDP and simulated transports behind it.
pub mod transport;

pub mod utils;

pub use benchmark::{run_targets, BenchmarkConfig, BenchmarkRunner, RunPhase};
pub use cli::{Args, Protocol};
pub use results::{ResultsManager, RunResult};
pub use session::{CounterSnapshot, RunCounters};
pub use targets::TargetSpec;
pub use transport::{Connection, Connector, NetworkConnector, SimulatedConnector, TransportError};

/// The current version of the benchmark
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Connections opened against every target
    pub const CLIENTS: usize = 100;

    /// Time between two rounds of sends
    pub const SEND_INTERVAL: Duration = Duration::from_millis(64);

    /// How long each target is observed
    pub const OBSERVATION_WINDOW: Duration = Duration::from_secs(10);

    /// Pause between two targets so the previous run's sockets are released
    pub const SETTLE_DELAY: Duration = Duration::from_secs(5);

    /// How long draining waits for the sender and sessions to stop
    pub const STOP_GRACE: Duration = Duration::from_secs(2);

    /// Payloads sent, in order, from every connection on every tick
    pub const MESSAGES: [&str; 3] = [
        "Hello World!",
        "Hello World! 1",
        "What is the meaning of life?",
    ];

    /// Environment variable that enables logging of every received payload
    pub const LOG_MESSAGES_ENV: &str = "LOG_MESSAGES";
}
