//! Per-target outcomes of each verification phase.
//!
//! Outcomes are data, not errors: a failed phase is recorded here and the run
//! moves on to the next phase or target.

use std::fmt;

use serde::Serialize;

use crate::target::VerificationTarget;

/// Terminal state of a claim binding attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ClaimStatus {
    /// Claim bound to a volume
    Bound,
    /// Timeout elapsed (or the claim was lost) without binding
    Unbound,
    /// Claim was never created or disappeared
    NotFound,
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound => write!(f, "Bound"),
            Self::Unbound => write!(f, "Unbound"),
            Self::NotFound => write!(f, "NotFound"),
        }
    }
}

/// Result of the claim phase for one target
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    /// Node under test
    pub node: String,
    /// Claim name
    pub claim_name: String,
    /// Terminal status
    pub status: ClaimStatus,
    /// Backing PersistentVolume, when bound
    pub volume: Option<String>,
    /// Last phase reported by the cluster
    pub last_phase: Option<String>,
    /// Extra context such as an API error
    pub detail: Option<String>,
}

impl ClaimOutcome {
    /// Claim bound to `volume`
    pub fn bound(target: &VerificationTarget, volume: Option<String>) -> Self {
        Self {
            volume,
            last_phase: Some("Bound".to_string()),
            ..Self::with_status(target, ClaimStatus::Bound)
        }
    }

    /// Claim never bound; `last_phase` is what was seen last
    pub fn unbound(target: &VerificationTarget, last_phase: Option<String>) -> Self {
        Self {
            last_phase,
            ..Self::with_status(target, ClaimStatus::Unbound)
        }
    }

    /// Claim missing, with optional explanation
    pub fn not_found(target: &VerificationTarget, detail: Option<String>) -> Self {
        Self {
            detail,
            ..Self::with_status(target, ClaimStatus::NotFound)
        }
    }

    fn with_status(target: &VerificationTarget, status: ClaimStatus) -> Self {
        Self {
            node: target.node().to_string(),
            claim_name: target.claim_name().to_string(),
            status,
            volume: None,
            last_phase: None,
            detail: None,
        }
    }

    /// Whether the claim is usable by a workload
    pub fn is_bound(&self) -> bool {
        self.status == ClaimStatus::Bound
    }
}

/// Terminal state of the diagnostic command
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DiagnosticStatus {
    /// Command exited zero
    Succeeded,
    /// Command exited non-zero, timed out or could not start
    Failed,
    /// Diagnostics are turned off
    Disabled,
}

impl fmt::Display for DiagnosticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Disabled => write!(f, "Disabled"),
        }
    }
}

/// Result of the diagnostic phase for one target
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticOutcome {
    /// Node under test
    pub node: String,
    /// Terminal status
    pub status: DiagnosticStatus,
    /// Process exit code, if it exited
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Why the command could not complete
    pub error: Option<String>,
}

impl DiagnosticOutcome {
    /// Diagnostics turned off for this run
    pub fn disabled(target: &VerificationTarget) -> Self {
        Self {
            node: target.node().to_string(),
            status: DiagnosticStatus::Disabled,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
        }
    }
}

/// Terminal state of the mount verification workload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "claimStatus")]
pub enum WorkloadStatus {
    /// Pod observed running
    Running,
    /// Pod failed or could not be created
    Failed,
    /// Pod never reached a terminal phase in time
    Timeout,
    /// Not attempted because the claim did not bind
    Skipped(ClaimStatus),
}

impl WorkloadStatus {
    /// Whether the workload was never attempted
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Skipped(claim) => write!(f, "Skipped({})", claim),
        }
    }
}

/// Result of the workload phase for one target
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadOutcome {
    /// Node under test
    pub node: String,
    /// Pod name
    pub pod_name: String,
    /// Terminal status
    pub status: WorkloadStatus,
    /// Last pod phase reported by the cluster
    pub last_phase: Option<String>,
    /// Failure reason (container waiting reason, API error)
    pub reason: Option<String>,
    /// Pod logs captured once running
    pub logs: Option<String>,
}

impl WorkloadOutcome {
    /// Outcome with only the status set
    pub fn new(target: &VerificationTarget, status: WorkloadStatus) -> Self {
        Self {
            node: target.node().to_string(),
            pod_name: target.pod_name().to_string(),
            status,
            last_phase: None,
            reason: None,
            logs: None,
        }
    }

    /// Not attempted because the claim is not bound
    pub fn skipped(target: &VerificationTarget, claim: ClaimStatus) -> Self {
        Self::new(target, WorkloadStatus::Skipped(claim))
    }

    /// Attach the last observed phase
    pub fn with_phase(mut self, phase: Option<String>) -> Self {
        self.last_phase = phase;
        self
    }

    /// Attach a failure reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> VerificationTarget {
        VerificationTarget::new("n1").unwrap()
    }

    #[test]
    fn bound_claim_records_volume() {
        let outcome = ClaimOutcome::bound(&target(), Some("pvc-123".to_string()));
        assert!(outcome.is_bound());
        assert_eq!(outcome.claim_name, "fc-test-pvc-n1");
        assert_eq!(outcome.volume.as_deref(), Some("pvc-123"));
    }

    #[test]
    fn skipped_display_names_claim_status() {
        let outcome = WorkloadOutcome::skipped(&target(), ClaimStatus::Unbound);
        assert_eq!(outcome.status.to_string(), "Skipped(Unbound)");
        assert_eq!(outcome.pod_name, "fc-test-pod-n1");
    }

    #[test]
    fn workload_status_serializes_with_claim_reason() {
        let json = serde_json::to_value(WorkloadStatus::Skipped(ClaimStatus::NotFound)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "Skipped", "claimStatus": "NotFound"})
        );
        let json = serde_json::to_value(WorkloadStatus::Running).unwrap();
        assert_eq!(json, serde_json::json!({"status": "Running"}));
    }
}
