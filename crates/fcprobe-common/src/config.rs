//! Verification policy: namespace, claim shape, timeouts, workload and
//! diagnostic command definitions.
//!
//! Every section deserializes with defaults so a config file only needs to
//! name the values it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::CommandTemplate;
use crate::poll::PollPolicy;
use crate::{Error, Result, DEFAULT_TEST_NAMESPACE};

/// How to pick a class when several are annotated as default
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultClassPolicy {
    /// Use the first default class in API order and report the others
    #[default]
    First,
    /// Refuse to guess
    Reject,
}

/// Complete verification policy for one run
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifyConfig {
    /// Namespace shared by every claim and pod of the run
    pub namespace: String,
    /// Label selector narrowing which nodes are tested
    pub node_selector: Option<String>,
    /// Ambiguous default class handling
    pub default_class_policy: DefaultClassPolicy,
    /// Claim creation and binding
    pub claim: ClaimConfig,
    /// Node diagnostic command
    pub diagnostics: DiagnosticsConfig,
    /// Mount verification pod
    pub workload: WorkloadConfig,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_TEST_NAMESPACE.to_string(),
            node_selector: None,
            default_class_policy: DefaultClassPolicy::default(),
            claim: ClaimConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            workload: WorkloadConfig::default(),
        }
    }
}

impl VerifyConfig {
    /// Reject values that would make every run fail in the same way
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::config("namespace must not be empty"));
        }
        if self.claim.size.trim().is_empty() {
            return Err(Error::config("claim.size must not be empty"));
        }
        if self.claim.poll_interval_secs == 0 || self.workload.poll_interval_secs == 0 {
            return Err(Error::config("poll intervals must be at least one second"));
        }
        if self.workload.image.trim().is_empty() {
            return Err(Error::config("workload.image must not be empty"));
        }
        if self.diagnostics.enabled && self.diagnostics.command.program.trim().is_empty() {
            return Err(Error::config(
                "diagnostics.command.program must be set when diagnostics are enabled",
            ));
        }
        Ok(())
    }
}

/// PersistentVolumeClaim parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClaimConfig {
    /// Requested storage quantity
    pub size: String,
    /// Access mode of the claim
    pub access_mode: String,
    /// Seconds to wait for the claim to bind
    pub timeout_secs: u64,
    /// Seconds between claim status queries
    pub poll_interval_secs: u64,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            size: "1Gi".to_string(),
            access_mode: "ReadWriteOnce".to_string(),
            timeout_secs: 60,
            poll_interval_secs: 2,
        }
    }
}

impl ClaimConfig {
    /// Binding poll policy
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.timeout_secs),
            Duration::from_secs(self.poll_interval_secs),
        )
    }
}

/// Diagnostic command dispatched against each node
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    /// Run the diagnostic command at all
    pub enabled: bool,
    /// Command template; `{node}` is replaced with the node name
    pub command: CommandTemplate,
    /// Seconds before the command is killed
    pub timeout_secs: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: CommandTemplate::fc_host_lip(),
            timeout_secs: 120,
        }
    }
}

impl DiagnosticsConfig {
    /// Bounded execution time of one diagnostic command
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Mount verification routine run inside the pod.
///
/// `MOUNT_PATH` and `NODE_NAME` are provided as environment variables.
pub const DEFAULT_VERIFY_SCRIPT: &str = r#"set -e
echo "== free space on $MOUNT_PATH"
df -h "$MOUNT_PATH"
echo "fcprobe marker from $NODE_NAME at $(date)" > "$MOUNT_PATH/fcprobe-marker.txt"
echo "== marker"
cat "$MOUNT_PATH/fcprobe-marker.txt"
echo "== contents of $MOUNT_PATH"
ls -la "$MOUNT_PATH"
echo "verification complete, idling"
exec sleep 3600
"#;

/// Seconds between log fetches while waiting for the completion marker
const LOG_POLL_INTERVAL_SECS: u64 = 1;

/// Verification pod parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkloadConfig {
    /// Container image providing `sh`, `df` and `ls`
    pub image: String,
    /// Mount path of the claim inside the container
    pub mount_path: String,
    /// Shell routine run by the container
    pub script: String,
    /// CPU request and limit
    pub cpu: String,
    /// Memory request and limit
    pub memory: String,
    /// Seconds to wait for the pod to reach Running
    pub timeout_secs: u64,
    /// Seconds between pod phase queries
    pub poll_interval_secs: u64,
    /// Seconds to wait for a previous pod with the same name to disappear
    pub delete_timeout_secs: u64,
    /// Log line printed by the routine once it has finished; empty takes the
    /// first log fetch as is
    pub log_marker: String,
    /// Seconds to wait for `log_marker` after the pod is Running
    pub log_wait_secs: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            image: "registry.access.redhat.com/ubi9/ubi-minimal:latest".to_string(),
            mount_path: "/data".to_string(),
            script: DEFAULT_VERIFY_SCRIPT.to_string(),
            cpu: "100m".to_string(),
            memory: "64Mi".to_string(),
            timeout_secs: 90,
            poll_interval_secs: 5,
            delete_timeout_secs: 60,
            log_marker: "verification complete".to_string(),
            log_wait_secs: 15,
        }
    }
}

impl WorkloadConfig {
    /// Readiness poll policy
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.timeout_secs),
            Duration::from_secs(self.poll_interval_secs),
        )
    }

    /// Poll policy while waiting for the routine's completion marker
    pub fn log_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.log_wait_secs),
            Duration::from_secs(LOG_POLL_INTERVAL_SECS),
        )
    }

    /// Poll policy while waiting for a stale pod to be deleted
    pub fn delete_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.delete_timeout_secs),
            Duration::from_secs(self.poll_interval_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = VerifyConfig::default();
        assert_eq!(config.namespace, "fc-storage-test");
        assert_eq!(config.claim.timeout_secs, 60);
        assert_eq!(config.workload.timeout_secs, 90);
        assert_eq!(config.workload.poll_interval_secs, 5);
        assert!(DEFAULT_VERIFY_SCRIPT.contains(&config.workload.log_marker));
        assert_eq!(
            config.workload.log_policy(),
            PollPolicy::new(Duration::from_secs(15), Duration::from_secs(1))
        );
        assert_eq!(config.default_class_policy, DefaultClassPolicy::First);
        assert!(config.diagnostics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{"namespace":"fc-debug","claim":{"timeoutSecs":120},"defaultClassPolicy":"reject"}"#;
        let config: VerifyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.namespace, "fc-debug");
        assert_eq!(config.claim.timeout_secs, 120);
        assert_eq!(config.claim.size, "1Gi");
        assert_eq!(config.default_class_policy, DefaultClassPolicy::Reject);
        assert_eq!(config.workload.mount_path, "/data");
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = VerifyConfig::default();
        config.workload.poll_interval_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn empty_program_only_matters_when_enabled() {
        let mut config = VerifyConfig::default();
        config.diagnostics.command.program = String::new();
        assert!(config.validate().is_err());
        config.diagnostics.enabled = false;
        assert!(config.validate().is_ok());
    }
}
