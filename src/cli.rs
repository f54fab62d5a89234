//! # Command-Line Interface
//!
//! Start-up configuration. Running without arguments reproduces the
//! built-in defaults; every flag only overrides one of them.

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Load Generation Benchmark - floods WebSocket, TCP and UDP servers with
/// concurrent clients and compares how many messages each one delivers
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Protocols to benchmark (space-separated: ws, tcp, udp, or all)
    #[clap(short = 'p', long, value_enum, default_values_t = vec![Protocol::All], num_args = 1..)]
    pub protocols: Vec<Protocol>,

    /// Number of concurrent clients opened against each server
    #[clap(short = 'c', long, default_value_t = crate::defaults::CLIENTS)]
    pub clients: usize,

    /// Interval between two rounds of sends
    #[clap(short = 'i', long, value_parser = parse_duration, default_value = "64ms")]
    pub interval: Duration,

    /// How long each server is observed
    #[clap(short = 'd', long, value_parser = parse_duration, default_value = "10s")]
    pub duration: Duration,

    /// Pause between two servers so the previous one can release its sockets
    #[clap(long, value_parser = parse_duration, default_value = "5s")]
    pub settle: Duration,

    /// Socket send/receive buffer size in bytes (OS default when omitted)
    #[clap(long)]
    pub buffer_size: Option<usize>,

    /// Report format written to stdout
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Run against in-process echo connections instead of real servers
    #[clap(long, default_value_t = false)]
    pub simulate: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            protocols: vec![Protocol::All],
            clients: crate::defaults::CLIENTS,
            interval: crate::defaults::SEND_INTERVAL,
            duration: crate::defaults::OBSERVATION_WINDOW,
            settle: crate::defaults::SETTLE_DELAY,
            buffer_size: None,
            format: OutputFormat::Text,
            simulate: false,
        }
    }
}

/// Transport family a target speaks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum Protocol {
    /// Message-framed WebSocket connection
    #[clap(name = "ws")]
    WebSocket,

    /// Raw TCP stream
    #[clap(name = "tcp")]
    Tcp,

    /// Raw UDP datagrams
    #[clap(name = "udp")]
    Udp,

    /// Every protocol in the target list
    #[clap(name = "all")]
    All,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::WebSocket => write!(f, "WS"),
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::All => write!(f, "ALL"),
        }
    }
}

impl Protocol {
    /// Expand the "All" variant to every concrete protocol
    pub fn expand_all(protocols: Vec<Protocol>) -> Vec<Protocol> {
        if protocols.contains(&Protocol::All) {
            vec![Protocol::WebSocket, Protocol::Tcp, Protocol::Udp]
        } else {
            protocols
        }
    }
}

/// Output format of the final report
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Whether received payloads should be echoed to the log.
///
/// Read once at start-up; only the exact value `1` enables it.
pub fn log_messages_from_env() -> bool {
    log_messages_enabled(std::env::var(crate::defaults::LOG_MESSAGES_ENV).ok().as_deref())
}

fn log_messages_enabled(value: Option<&str>) -> bool {
    value == Some("1")
}

/// Parse duration from string (e.g., "64ms", "10s", "5m", "1h")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, millis_per_unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, 1.0)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1_000.0)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60_000.0)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 3_600_000.0)
    } else {
        (s, 1_000.0) // Default to seconds
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    Ok(Duration::from_millis((num * millis_per_unit) as u64))
}
