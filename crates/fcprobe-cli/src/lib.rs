//! fcprobe CLI library

pub mod commands;
pub mod config;
pub mod error;
pub mod prompt;

pub use error::{Error, Result};

use clap::Parser;
use tokio_util::sync::CancellationToken;

/// fcprobe - verify storage provisioning on every schedulable node
#[derive(Parser, Debug)]
#[command(name = "fcprobe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub verify: commands::verify::VerifyArgs,
}

/// Exit status once the report has been produced
pub const EXIT_OK: u8 = 0;

/// Exit status of a failed setup or an aborted run
pub const EXIT_FAILURE: u8 = 1;

/// Process exit status for the outcome of [`Cli::run`].
///
/// Per-node failures are part of the report and do not change it.
pub fn exit_status(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => EXIT_OK,
        Err(_) => EXIT_FAILURE,
    }
}

impl Cli {
    /// Run a verification; `cancel` stops the run between nodes
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        commands::verify::run(self.verify, cancel).await
    }
}
