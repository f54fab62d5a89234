//! # Utility Functions
//!
//! Small helpers shared by the configuration and reporting code: input
//! validation with clear error messages and human-readable duration output.

use anyhow::{bail, Result};
use std::time::Duration;

/// Upper bound on clients per run; each one holds a socket and a task
pub const MAX_CLIENTS: usize = 10_000;

/// Upper bound on any configured timing parameter
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Format a duration with an appropriate unit
///
/// ## Examples
///
/// ```rust
/// # use loadgen_benchmark::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_millis(64)), "64ms");
/// assert_eq!(format_duration(Duration::from_secs(10)), "10.00s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{:.2}m", duration.as_secs_f64() / 60.0)
    }
}

/// Validate the number of clients per run
pub fn validate_clients(clients: usize) -> Result<()> {
    if clients == 0 {
        bail!("Client count must be greater than 0");
    }
    if clients > MAX_CLIENTS {
        bail!(
            "Client count {} exceeds the maximum of {}",
            clients,
            MAX_CLIENTS
        );
    }
    Ok(())
}

/// Validate that a timing parameter is non-zero and at most [`MAX_DURATION`]
pub fn validate_duration(what: &str, duration: Duration) -> Result<()> {
    if duration.is_zero() {
        bail!("The {} must be greater than zero", what);
    }
    validate_duration_bound(what, duration)
}

/// Validate that a timing parameter, which may be zero, is at most
/// [`MAX_DURATION`]
pub fn validate_duration_bound(what: &str, duration: Duration) -> Result<()> {
    if duration > MAX_DURATION {
        bail!(
            "The {} of {} exceeds the maximum of {}",
            what,
            format_duration(duration),
            format_duration(MAX_DURATION)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(64)), "64ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.50m");
    }

    #[test]
    fn test_validate_clients() {
        assert!(validate_clients(1).is_ok());
        assert!(validate_clients(100).is_ok());
        assert!(validate_clients(0).is_err());
        assert!(validate_clients(MAX_CLIENTS + 1).is_err());
    }

    #[test]
    fn test_validate_duration() {
        assert!(validate_duration("interval", Duration::from_millis(1)).is_ok());
        let err = validate_duration("interval", Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("interval"));
        assert!(validate_duration("interval", MAX_DURATION).is_ok());
        assert!(validate_duration("interval", MAX_DURATION + Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_validate_duration_bound_allows_zero() {
        assert!(validate_duration_bound("settle delay", Duration::ZERO).is_ok());
        assert!(validate_duration_bound("settle delay", Duration::from_millis(u64::MAX)).is_err());
    }
}
