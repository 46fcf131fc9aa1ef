//! CLI commands

use std::fmt::Display;
use std::time::Duration;

use clap::ValueEnum;

use crate::{Error, Result};

pub mod format;
pub mod verify;

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
///
/// This reduces boilerplate for the common pattern of `.map_err(|e| Error::command_failed(e.to_string()))`.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Output format
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
}

/// Parse a human-friendly duration string.
///
/// Supports `Nh` (hours), `Nm` (minutes), and `Ns` (seconds).
/// Examples: "1h", "2m", "90s", or "90" for raw seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || Error::validation(format!("invalid duration: {}", s));
    let secs: u64 = if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .map_err(|_| invalid())?
            .checked_mul(3600)
            .ok_or_else(invalid)?
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes
            .parse::<u64>()
            .map_err(|_| invalid())?
            .checked_mul(60)
            .ok_or_else(invalid)?
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse().map_err(|_| invalid())?
    } else {
        // Try parsing as raw seconds
        s.parse().map_err(|_| {
            Error::validation(format!(
                "invalid duration '{}', expected e.g. 90s, 2m, 1h",
                s
            ))
        })?
    };
    if secs == 0 {
        return Err(Error::validation("duration must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}
