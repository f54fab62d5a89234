//! Servers under test and protocol-based selection.

use crate::cli::Protocol;
use serde::{Deserialize, Serialize};

/// One server under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    /// `ws://host:port` for WebSocket targets, `host:port` otherwise
    pub address: String,
    pub protocol: Protocol,
}

impl TargetSpec {
    pub fn new(name: impl Into<String>, address: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            protocol,
        }
    }
}

/// The compiled-in server list, in benchmark order
pub fn default_targets() -> Vec<TargetSpec> {
    vec![
        TargetSpec::new("C# WebSocket", "ws://127.0.0.1:3001", Protocol::WebSocket),
        TargetSpec::new("C# TCP", "127.0.0.1:4001", Protocol::Tcp),
        TargetSpec::new("C# UDP", "127.0.0.1:5001", Protocol::Udp),
    ]
}

/// Keep the targets whose protocol was selected, preserving list order
pub fn select_targets(targets: Vec<TargetSpec>, protocols: Vec<Protocol>) -> Vec<TargetSpec> {
    let protocols = Protocol::expand_all(protocols);
    targets
        .into_iter()
        .filter(|target| protocols.contains(&target.protocol))
        .collect()
}
