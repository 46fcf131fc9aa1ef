//! Out-of-band node diagnostics
//!
//! The command itself is configuration: a [`CommandTemplate`] is rendered into
//! a typed [`CommandRequest`] (program + argv, no shell in between) and handed
//! to a [`CommandExecutor`]. The only substitution is the `{node}`
//! placeholder, applied per argument.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::DiagnosticsConfig;
use crate::outcome::{DiagnosticOutcome, DiagnosticStatus};
use crate::target::VerificationTarget;
use crate::Error;

/// Placeholder replaced with the node name
pub const NODE_PLACEHOLDER: &str = "{node}";

/// Script run on the node host by the default template: print the state of
/// every FC host adapter, then force a link reinitialization.
pub const FC_HOST_LIP_SCRIPT: &str = r#"for host in /sys/class/fc_host/host*; do
  [ -e "$host" ] || { echo "no fc_host adapters found"; exit 1; }
  echo "== $host"
  echo "port_state: $(cat "$host/port_state" 2>/dev/null)"
  echo "port_name: $(cat "$host/port_name" 2>/dev/null)"
  echo "speed: $(cat "$host/speed" 2>/dev/null)"
  echo 1 > "$host/issue_lip" && echo "issue_lip: sent"
done
"#;

/// Program and argument templates of an external command
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandTemplate {
    /// Executable to run
    pub program: String,
    /// Arguments; `{node}` is substituted in each
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self::fc_host_lip()
    }
}

impl CommandTemplate {
    /// `oc debug node/{node} -- chroot /host sh -c <FC_HOST_LIP_SCRIPT>`
    pub fn fc_host_lip() -> Self {
        Self {
            program: "oc".to_string(),
            args: [
                "debug",
                "node/{node}",
                "--",
                "chroot",
                "/host",
                "sh",
                "-c",
                FC_HOST_LIP_SCRIPT,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }

    /// Render the template for one node
    pub fn render(&self, node: &str, timeout: Duration) -> CommandRequest {
        CommandRequest {
            program: self.program.replace(NODE_PLACEHOLDER, node),
            args: self
                .args
                .iter()
                .map(|arg| arg.replace(NODE_PLACEHOLDER, node))
                .collect(),
            timeout,
        }
    }
}

/// A fully rendered command ready to execute
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    /// Executable
    pub program: String,
    /// Arguments, passed as-is
    pub args: Vec<String>,
    /// Kill the process after this long
    pub timeout: Duration,
}

/// Captured result of a finished command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait abstracting external command execution
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the command to completion or until its timeout.
    ///
    /// `Err` means the command could not be run or was killed; a non-zero
    /// exit is reported through `CommandOutput::exit_code`.
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, Error>;
}

/// Executes commands as local child processes
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, Error> {
        let child = Command::new(&request.program)
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::command(&request.program, e.to_string()))?;

        let output = tokio::time::timeout(request.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::command(
                    &request.program,
                    format!("timed out after {}s", request.timeout.as_secs()),
                )
            })?
            .map_err(|e| Error::command(&request.program, e.to_string()))?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs the configured diagnostic command against each target
pub struct DiagnosticDispatcher {
    executor: Arc<dyn CommandExecutor>,
    config: DiagnosticsConfig,
}

impl DiagnosticDispatcher {
    /// Create a dispatcher
    pub fn new(executor: Arc<dyn CommandExecutor>, config: DiagnosticsConfig) -> Self {
        Self { executor, config }
    }

    /// Run the diagnostic for `target`. Never fails; the outcome records what
    /// happened.
    pub async fn dispatch(&self, target: &VerificationTarget) -> DiagnosticOutcome {
        if !self.config.enabled {
            return DiagnosticOutcome::disabled(target);
        }

        let request = self.config.command.render(target.node(), self.config.timeout());
        info!(
            node = %target.node(),
            program = %request.program,
            "Running node diagnostic"
        );

        let outcome = match self.executor.run(&request).await {
            Ok(output) => DiagnosticOutcome {
                node: target.node().to_string(),
                status: if output.success() {
                    DiagnosticStatus::Succeeded
                } else {
                    DiagnosticStatus::Failed
                },
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
                error: None,
            },
            Err(e) => DiagnosticOutcome {
                node: target.node().to_string(),
                status: DiagnosticStatus::Failed,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                error: Some(e.to_string()),
            },
        };

        if outcome.status == DiagnosticStatus::Failed {
            warn!(
                node = %target.node(),
                phase = "diagnostic",
                status = %outcome.status,
                exit_code = ?outcome.exit_code,
                error = outcome.error.as_deref().unwrap_or(""),
                stderr = %outcome.stderr.trim(),
                "Node diagnostic failed"
            );
        }
        outcome
    }
}
