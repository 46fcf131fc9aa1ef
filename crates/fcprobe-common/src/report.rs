//! Run report aggregation

use serde::Serialize;

use crate::outcome::{
    ClaimOutcome, ClaimStatus, DiagnosticOutcome, DiagnosticStatus, WorkloadOutcome,
    WorkloadStatus,
};
use crate::target::VerificationTarget;
use crate::{Error, Result};

/// Claim outcome counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimCounts {
    /// Bound claims
    pub bound: usize,
    /// Claims that never bound
    pub unbound: usize,
    /// Claims missing or never created
    pub not_found: usize,
}

impl ClaimCounts {
    /// Sum over every status
    pub fn total(&self) -> usize {
        self.bound + self.unbound + self.not_found
    }
}

/// Diagnostic outcome counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticCounts {
    /// Commands that exited zero
    pub succeeded: usize,
    /// Commands that failed
    pub failed: usize,
    /// Targets with diagnostics turned off
    pub disabled: usize,
}

impl DiagnosticCounts {
    /// Sum over every status
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.disabled
    }
}

/// Workload outcome counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadCounts {
    /// Pods observed running
    pub running: usize,
    /// Pods that failed
    pub failed: usize,
    /// Pods that never became ready in time
    pub timeout: usize,
    /// Targets skipped because their claim did not bind
    pub skipped: usize,
}

impl WorkloadCounts {
    /// Sum over every status
    pub fn total(&self) -> usize {
        self.running + self.failed + self.timeout + self.skipped
    }
}

/// Every outcome recorded for one node
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    /// Node under test
    pub node: String,
    /// Claim phase
    pub claim: ClaimOutcome,
    /// Diagnostic phase
    pub diagnostic: DiagnosticOutcome,
    /// Workload phase
    pub workload: WorkloadOutcome,
}

impl TargetReport {
    /// Whether the node passed end to end
    pub fn passed(&self) -> bool {
        self.claim.status == ClaimStatus::Bound && self.workload.status == WorkloadStatus::Running
    }
}

/// Aggregate of one verification run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// StorageClass every claim used
    pub storage_class: String,
    /// Namespace holding the test resources
    pub namespace: String,
    /// Number of targets processed
    pub total_targets: usize,
    /// Claim status counts
    pub claims: ClaimCounts,
    /// Diagnostic status counts
    pub diagnostics: DiagnosticCounts,
    /// Workload status counts
    pub workloads: WorkloadCounts,
    /// Per-node outcomes in enumeration order
    pub targets: Vec<TargetReport>,
    /// The run was cancelled before every node was processed
    pub interrupted: bool,
}

impl RunReport {
    /// Build a report from the per-phase outcome collections.
    ///
    /// Pure and deterministic. Each collection must hold exactly one outcome
    /// per target, in target order.
    pub fn aggregate(
        storage_class: impl Into<String>,
        namespace: impl Into<String>,
        targets: &[VerificationTarget],
        claims: Vec<ClaimOutcome>,
        diagnostics: Vec<DiagnosticOutcome>,
        workloads: Vec<WorkloadOutcome>,
    ) -> Result<Self> {
        if claims.len() != targets.len()
            || diagnostics.len() != targets.len()
            || workloads.len() != targets.len()
        {
            return Err(Error::Internal(format!(
                "outcome count mismatch: {} targets, {} claims, {} diagnostics, {} workloads",
                targets.len(),
                claims.len(),
                diagnostics.len(),
                workloads.len()
            )));
        }

        let mut claim_counts = ClaimCounts::default();
        let mut diagnostic_counts = DiagnosticCounts::default();
        let mut workload_counts = WorkloadCounts::default();
        let mut rows = Vec::with_capacity(targets.len());

        let outcomes = claims.into_iter().zip(diagnostics).zip(workloads);
        for (target, ((claim, diagnostic), workload)) in targets.iter().zip(outcomes) {
            let node = target.node();
            if claim.node != node || diagnostic.node != node || workload.node != node {
                return Err(Error::Internal(format!(
                    "outcomes out of order at node {}",
                    node
                )));
            }
            if workload.status.is_skipped() == claim.is_bound() {
                return Err(Error::Internal(format!(
                    "workload for {} is {} but claim is {}",
                    node, workload.status, claim.status
                )));
            }

            match claim.status {
                ClaimStatus::Bound => claim_counts.bound += 1,
                ClaimStatus::Unbound => claim_counts.unbound += 1,
                ClaimStatus::NotFound => claim_counts.not_found += 1,
            }
            match diagnostic.status {
                DiagnosticStatus::Succeeded => diagnostic_counts.succeeded += 1,
                DiagnosticStatus::Failed => diagnostic_counts.failed += 1,
                DiagnosticStatus::Disabled => diagnostic_counts.disabled += 1,
            }
            match workload.status {
                WorkloadStatus::Running => workload_counts.running += 1,
                WorkloadStatus::Failed => workload_counts.failed += 1,
                WorkloadStatus::Timeout => workload_counts.timeout += 1,
                WorkloadStatus::Skipped(_) => workload_counts.skipped += 1,
            }

            rows.push(TargetReport {
                node: node.to_string(),
                claim,
                diagnostic,
                workload,
            });
        }

        Ok(Self {
            storage_class: storage_class.into(),
            namespace: namespace.into(),
            total_targets: targets.len(),
            claims: claim_counts,
            diagnostics: diagnostic_counts,
            workloads: workload_counts,
            targets: rows,
            interrupted: false,
        })
    }

    /// Mark the report as covering only part of the nodes
    pub fn mark_interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }

    /// Nodes that passed end to end
    pub fn passed(&self) -> usize {
        self.targets.iter().filter(|t| t.passed()).count()
    }

    /// Rows of nodes that did not pass
    pub fn failures(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| !t.passed())
    }
}
