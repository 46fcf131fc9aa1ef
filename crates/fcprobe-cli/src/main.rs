//! fcprobe CLI
//!
//! Verifies storage provisioning on every schedulable node of a cluster.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fcprobe_cli::{exit_status, Cli};

/// Exit status after a second interrupt
const INTERRUPTED_EXIT: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so `-o json` output stays parseable
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping after the current node (press Ctrl-C again to exit)");
        signal_token.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(INTERRUPTED_EXIT);
        }
    });

    let result = cli.run(cancel).await;
    if let Err(e) = &result {
        error!("{}", e);
    }
    ExitCode::from(exit_status(&result))
}
