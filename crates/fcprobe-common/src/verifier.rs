//! Provisioning verification pipeline
//!
//! Setup (`check_access`, `resolve_storage_class`, `enumerate_targets`,
//! `prepare_namespace`) fails fast and mutates nothing before the namespace
//! is prepared. `run` then processes targets one at a time, each through
//! claim → diagnostic → workload, and never lets one target's failure stop
//! the others.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::claim::ClaimBinder;
use crate::client::ClusterClient;
use crate::config::VerifyConfig;
use crate::diagnostics::{CommandExecutor, DiagnosticDispatcher};
use crate::nodes;
use crate::outcome::{ClaimOutcome, DiagnosticOutcome, WorkloadOutcome};
use crate::report::RunReport;
use crate::storage_class::{self, ClassResolution};
use crate::target::VerificationTarget;
use crate::workload::WorkloadVerifier;
use crate::Result;

/// Outcomes of one target, produced in phase order
#[derive(Clone, Debug)]
pub struct TargetOutcomes {
    /// Claim phase
    pub claim: ClaimOutcome,
    /// Diagnostic phase
    pub diagnostic: DiagnosticOutcome,
    /// Workload phase
    pub workload: WorkloadOutcome,
}

/// Drives a verification run against a cluster
pub struct ProvisioningVerifier {
    client: Arc<dyn ClusterClient>,
    executor: Arc<dyn CommandExecutor>,
    config: VerifyConfig,
}

impl ProvisioningVerifier {
    /// Create a verifier
    pub fn new(
        client: Arc<dyn ClusterClient>,
        executor: Arc<dyn CommandExecutor>,
        config: VerifyConfig,
    ) -> Self {
        Self {
            client,
            executor,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Verify the cluster is reachable with the current credentials
    pub async fn check_access(&self) -> Result<String> {
        let version = self.client.server_version().await?;
        info!(version = %version, "Connected to cluster");
        Ok(version)
    }

    /// Resolve the StorageClass to provision from
    pub async fn resolve_storage_class(&self, explicit: Option<&str>) -> Result<ClassResolution> {
        storage_class::resolve_storage_class(
            self.client.as_ref(),
            explicit,
            self.config.default_class_policy,
        )
        .await
    }

    /// Targets for every schedulable node
    pub async fn enumerate_targets(&self) -> Result<Vec<VerificationTarget>> {
        nodes::enumerate_targets(self.client.as_ref(), self.config.node_selector.as_deref()).await
    }

    /// Create the shared test namespace
    pub async fn prepare_namespace(&self) -> Result<()> {
        self.client.ensure_namespace(&self.config.namespace).await?;
        info!(namespace = %self.config.namespace, "Test namespace ready");
        Ok(())
    }

    /// Delete the test namespace with every claim and pod in it
    pub async fn teardown(&self) -> Result<()> {
        self.client.delete_namespace(&self.config.namespace).await
    }

    /// Run claim → diagnostic → workload for a single target
    #[instrument(skip_all, fields(node = %target.node()))]
    pub async fn verify_target(
        &self,
        target: &VerificationTarget,
        storage_class: &str,
    ) -> TargetOutcomes {
        let binder = ClaimBinder::new(
            Arc::clone(&self.client),
            &self.config.namespace,
            storage_class,
            self.config.claim.clone(),
        );
        let dispatcher =
            DiagnosticDispatcher::new(Arc::clone(&self.executor), self.config.diagnostics.clone());
        let workloads = WorkloadVerifier::new(
            Arc::clone(&self.client),
            &self.config.namespace,
            self.config.workload.clone(),
        );

        let claim = binder.bind(target).await;
        let diagnostic = dispatcher.dispatch(target).await;
        let workload = workloads.verify(target, &claim).await;

        TargetOutcomes {
            claim,
            diagnostic,
            workload,
        }
    }

    /// Verify every target in order and aggregate the report.
    ///
    /// `cancel` is honoured between targets; a cancelled run reports the
    /// targets processed so far and is marked interrupted.
    pub async fn run(
        &self,
        storage_class: &str,
        targets: &[VerificationTarget],
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let mut claims = Vec::with_capacity(targets.len());
        let mut diagnostics = Vec::with_capacity(targets.len());
        let mut workloads = Vec::with_capacity(targets.len());
        let mut processed = 0;

        for (index, target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    processed = index,
                    remaining = targets.len() - index,
                    "Run cancelled, stopping before next node"
                );
                break;
            }

            info!(
                node = %target.node(),
                "Verifying node {}/{}",
                index + 1,
                targets.len()
            );
            let outcomes = self.verify_target(target, storage_class).await;
            claims.push(outcomes.claim);
            diagnostics.push(outcomes.diagnostic);
            workloads.push(outcomes.workload);
            processed += 1;
        }

        let report = RunReport::aggregate(
            storage_class,
            &self.config.namespace,
            &targets[..processed],
            claims,
            diagnostics,
            workloads,
        )?;

        if processed < targets.len() {
            Ok(report.mark_interrupted())
        } else {
            Ok(report)
        }
    }
}
