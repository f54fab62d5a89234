//! # Results Aggregation
//!
//! Collects one [`RunResult`] per completed run and turns the set into the
//! comparative report. Aggregation happens once, after every run has
//! finished:
//!
//! 1. Compute the mean of the run averages.
//! 2. Annotate every result with its signed percentage deviation from it.
//! 3. Stable-sort the results by average, highest first.
//!
//! The text report is one fixed-format block per result; the JSON report adds
//! crate version, timestamp and host information.

use crate::{cli::Protocol, session::CounterSnapshot, targets::TargetSpec};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Aggregation failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("no benchmark runs completed; nothing to aggregate")]
    NoResults,
}

/// Outcome of one run against one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub name: String,
    pub protocol: Protocol,
    pub address: String,
    /// Messages observed during the run
    pub average: f64,
    pub lost_packets: u64,
    /// Signed deviation from the cross-run mean, filled in by aggregation
    pub percentage: f64,
    pub messages_per_second: f64,
    pub configured_clients: usize,
    pub live_connections: usize,
    pub sessions_started: usize,
}

impl RunResult {
    pub fn new(name: impl Into<String>, protocol: Protocol, average: f64, lost_packets: u64) -> Self {
        Self {
            name: name.into(),
            protocol,
            address: String::new(),
            average,
            lost_packets,
            percentage: 0.0,
            messages_per_second: 0.0,
            configured_clients: 0,
            live_connections: 0,
            sessions_started: 0,
        }
    }

    /// Build the result of a finished run from its final counters
    pub fn from_run(
        target: &TargetSpec,
        snapshot: CounterSnapshot,
        window: Duration,
        configured_clients: usize,
        live_connections: usize,
        sessions_started: usize,
    ) -> Self {
        let average = snapshot.received as f64;
        let seconds = window.as_secs_f64();
        Self {
            address: target.address.clone(),
            messages_per_second: if seconds > 0.0 { average / seconds } else { 0.0 },
            configured_clients,
            live_connections,
            sessions_started,
            ..Self::new(target.name.clone(), target.protocol, average, snapshot.lost)
        }
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Server: {}", self.name)?;
        writeln!(f, "Avg Messages/sec: {:.2}", self.average)?;
        writeln!(f, "Lost Packets: {}", self.lost_packets)?;
        writeln!(f, "Percentage Difference: {:.2}%", self.percentage)
    }
}

/// Mean of the run averages
pub fn mean_average(results: &[RunResult]) -> Result<f64, AggregateError> {
    if results.is_empty() {
        return Err(AggregateError::NoResults);
    }
    Ok(results.iter().map(|r| r.average).sum::<f64>() / results.len() as f64)
}

/// Fill in every result's signed percentage deviation from the mean.
///
/// When every run observed nothing the mean is zero and all deviations are
/// reported as 0 instead of NaN.
pub fn apply_percentages(results: &mut [RunResult]) -> Result<f64, AggregateError> {
    let mean = mean_average(results)?;
    for result in results.iter_mut() {
        result.percentage = if mean == 0.0 {
            0.0
        } else {
            (result.average - mean) / mean * 100.0
        };
    }
    Ok(mean)
}

/// Stable sort, highest average first
pub fn rank_by_average(results: &mut [RunResult]) {
    results.sort_by(|a, b| b.average.total_cmp(&a.average));
}

/// Render results as consecutive text blocks separated by blank lines
pub fn render_text(results: &[RunResult]) -> String {
    let mut out = String::new();
    for result in results {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}", result);
    }
    out
}

/// System information recorded alongside JSON reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub benchmark_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

/// Benchmark metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct BenchmarkMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub total_runs: usize,
    pub mean_average: f64,
    pub system_info: SystemInfo,
}

/// Final report structure for JSON output
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalReport {
    pub metadata: BenchmarkMetadata,
    pub results: Vec<RunResult>,
}

/// Collects run results and turns them into the comparative report
#[derive(Debug, Default)]
pub struct ResultsManager {
    results: Vec<RunResult>,
    mean: Option<f64>,
}

impl ResultsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the result of a completed run
    pub fn add_result(&mut self, result: RunResult) {
        info!("Adding results for {}", result.name);
        self.results.push(result);
    }

    pub fn results(&self) -> &[RunResult] {
        &self.results
    }

    /// Compute percentages against the mean and rank the results.
    ///
    /// Fails when no run has completed.
    pub fn finalize(&mut self) -> Result<(), AggregateError> {
        let mean = apply_percentages(&mut self.results)?;
        rank_by_average(&mut self.results);
        self.mean = Some(mean);
        Ok(())
    }

    pub fn render_text(&self) -> String {
        render_text(&self.results)
    }

    pub fn to_json(&self) -> Result<String> {
        let report = FinalReport {
            metadata: BenchmarkMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                total_runs: self.results.len(),
                mean_average: self.mean.unwrap_or_default(),
                system_info: SystemInfo::default(),
            },
            results: self.results.clone(),
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }
}
