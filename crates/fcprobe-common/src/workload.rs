//! Mount verification workload
//!
//! For a target with a bound claim: remove any stale pod of the same name,
//! start a pod pinned to the node that mounts the claim and runs the
//! verification routine, then take a single readiness observation pass. Once
//! Running is seen the pod is not queried again; this is a one-shot check, not
//! a health monitor.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvVar, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, PersistentVolumeClaimVolumeSource, Pod, PodSpec, ResourceRequirements,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::{info, warn};

use crate::claim::target_metadata;
use crate::client::{ClusterClient, PodState};
use crate::config::WorkloadConfig;
use crate::outcome::{ClaimOutcome, WorkloadOutcome, WorkloadStatus};
use crate::poll::{poll_until_ready, wait_for_deletion, PollOutcome, Check};
use crate::target::VerificationTarget;

const CONTAINER_NAME: &str = "verify";
const VOLUME_NAME: &str = "test-volume";

/// Build the verification pod for `target`
pub fn build_verification_pod(
    target: &VerificationTarget,
    namespace: &str,
    config: &WorkloadConfig,
) -> Pod {
    let resources: BTreeMap<String, Quantity> = BTreeMap::from([
        ("cpu".to_string(), Quantity(config.cpu.clone())),
        ("memory".to_string(), Quantity(config.memory.clone())),
    ]);

    let env = |name: &str, value: &str| EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    };

    Pod {
        metadata: target_metadata(target.pod_name(), namespace, target),
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            termination_grace_period_seconds: Some(0),
            affinity: Some(Affinity {
                node_affinity: Some(NodeAffinity {
                    required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                        node_selector_terms: vec![NodeSelectorTerm {
                            match_fields: Some(vec![NodeSelectorRequirement {
                                key: "metadata.name".to_string(),
                                operator: "In".to_string(),
                                values: Some(vec![target.node().to_string()]),
                            }]),
                            match_expressions: None,
                        }],
                    }),
                    preferred_during_scheduling_ignored_during_execution: None,
                }),
                ..Default::default()
            }),
            containers: vec![Container {
                name: CONTAINER_NAME.to_string(),
                image: Some(config.image.clone()),
                command: Some(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    config.script.clone(),
                ]),
                env: Some(vec![
                    env("MOUNT_PATH", &config.mount_path),
                    env("NODE_NAME", target.node()),
                ]),
                volume_mounts: Some(vec![VolumeMount {
                    name: VOLUME_NAME.to_string(),
                    mount_path: config.mount_path.clone(),
                    ..Default::default()
                }]),
                resources: Some(ResourceRequirements {
                    requests: Some(resources.clone()),
                    limits: Some(resources),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: VOLUME_NAME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: target.claim_name().to_string(),
                    read_only: None,
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Terminal observation of the readiness poll
enum PodVerdict {
    Running(Option<String>),
    Failed {
        phase: Option<String>,
        reason: String,
    },
}

/// Starts verification pods and observes them until Running
pub struct WorkloadVerifier {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    config: WorkloadConfig,
}

impl WorkloadVerifier {
    /// Create a verifier working in `namespace`
    pub fn new(
        client: Arc<dyn ClusterClient>,
        namespace: impl Into<String>,
        config: WorkloadConfig,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            config,
        }
    }

    /// Verify the target's claim can be mounted and written on its node.
    ///
    /// Returns `Skipped` without touching the cluster when the claim is not
    /// bound. Never fails.
    pub async fn verify(
        &self,
        target: &VerificationTarget,
        claim: &ClaimOutcome,
    ) -> WorkloadOutcome {
        if !claim.is_bound() {
            warn!(
                node = %target.node(),
                phase = "workload",
                status = %WorkloadStatus::Skipped(claim.status),
                "Skipping workload, claim not bound"
            );
            return WorkloadOutcome::skipped(target, claim.status);
        }

        self.remove_stale_pod(target).await;

        let pod = build_verification_pod(target, &self.namespace, &self.config);
        if let Err(e) = self.client.create_pod(&self.namespace, &pod).await {
            warn!(
                node = %target.node(),
                phase = "workload",
                status = "Failed",
                error = %e,
                "Failed to create verification pod"
            );
            return WorkloadOutcome::new(target, WorkloadStatus::Failed)
                .with_reason(format!("create failed: {}", e));
        }
        info!(node = %target.node(), pod = %target.pod_name(), "Created verification pod");

        let outcome = match self.await_running(target).await {
            PollOutcome::Ready(PodVerdict::Running(phase)) => {
                let mut outcome =
                    WorkloadOutcome::new(target, WorkloadStatus::Running).with_phase(phase);
                outcome.logs = self.capture_logs(target).await;
                info!(node = %target.node(), "Verification pod running");
                return outcome;
            }
            PollOutcome::Ready(PodVerdict::Failed { phase, reason }) => {
                WorkloadOutcome::new(target, WorkloadStatus::Failed)
                    .with_phase(phase)
                    .with_reason(reason)
            }
            PollOutcome::TimedOut { last_observed } => {
                WorkloadOutcome::new(target, WorkloadStatus::Timeout).with_phase(last_observed)
            }
        };

        warn!(
            node = %target.node(),
            phase = "workload",
            status = %outcome.status,
            pod_phase = outcome.last_phase.as_deref().unwrap_or("unknown"),
            reason = outcome.reason.as_deref().unwrap_or(""),
            "Verification pod did not reach Running"
        );
        outcome
    }

    async fn remove_stale_pod(&self, target: &VerificationTarget) {
        match self
            .client
            .delete_pod(&self.namespace, target.pod_name())
            .await
        {
            Ok(true) => {
                info!(pod = %target.pod_name(), "Deleted stale verification pod");
                let client = Arc::clone(&self.client);
                let namespace = self.namespace.clone();
                let name = target.pod_name().to_string();
                let description = format!("pod {}", name);
                wait_for_deletion(self.config.delete_policy(), &description, || {
                    let client = Arc::clone(&client);
                    let namespace = namespace.clone();
                    let name = name.clone();
                    async move {
                        client
                            .get_pod(&namespace, &name)
                            .await
                            .map(|pod| pod.is_some())
                            .map_err(|e| e.to_string())
                    }
                })
                .await;
            }
            Ok(false) => {}
            Err(e) => {
                // Creation below reports the real problem if the pod is still there
                warn!(pod = %target.pod_name(), error = %e, "Failed to delete stale pod");
            }
        }
    }

    async fn await_running(&self, target: &VerificationTarget) -> PollOutcome<PodVerdict> {
        let client = Arc::clone(&self.client);
        let namespace = self.namespace.clone();
        let name = target.pod_name().to_string();
        let description = format!("pod {} to run", name);

        poll_until_ready(self.config.poll_policy(), &description, || {
            let client = Arc::clone(&client);
            let namespace = namespace.clone();
            let name = name.clone();
            async move {
                match client.get_pod(&namespace, &name).await {
                    Ok(Some(state)) => classify_pod(state),
                    Ok(None) => Check::Pending(None),
                    Err(e) => {
                        warn!(pod = %name, error = %e, "Pod status query failed, retrying");
                        Check::Pending(None)
                    }
                }
            }
        })
        .await
    }

    /// Fetch the container log once the routine prints its completion marker.
    ///
    /// Only the log is re-read here; the pod state is not queried again. When
    /// the marker never shows up the last log fetched is kept.
    async fn capture_logs(&self, target: &VerificationTarget) -> Option<String> {
        let client = Arc::clone(&self.client);
        let namespace = self.namespace.clone();
        let name = target.pod_name().to_string();
        let marker = self.config.log_marker.clone();
        let description = format!("pod {} logs", name);

        let outcome = poll_until_ready(self.config.log_policy(), &description, || {
            let client = Arc::clone(&client);
            let namespace = namespace.clone();
            let name = name.clone();
            let marker = marker.clone();
            async move {
                match client.pod_logs(&namespace, &name).await {
                    Ok(logs) if logs.contains(marker.as_str()) => Check::Ready(logs),
                    Ok(logs) => Check::Pending(Some(logs)),
                    Err(e) => {
                        warn!(pod = %name, error = %e, "Failed to fetch pod logs");
                        Check::Pending(None)
                    }
                }
            }
        })
        .await;

        match outcome {
            PollOutcome::Ready(logs) => Some(logs),
            PollOutcome::TimedOut { last_observed } => last_observed,
        }
    }
}

fn classify_pod(state: PodState) -> Check<PodVerdict> {
    if let Some(reason) = state.failure_reason {
        return Check::Ready(PodVerdict::Failed {
            phase: state.phase,
            reason,
        });
    }
    match state.phase.as_deref() {
        Some("Running") => Check::Ready(PodVerdict::Running(state.phase)),
        Some("Failed") => Check::Ready(PodVerdict::Failed {
            phase: state.phase,
            reason: "pod failed".to_string(),
        }),
        Some("Succeeded") => Check::Ready(PodVerdict::Failed {
            phase: state.phase,
            reason: "verification routine exited instead of idling".to_string(),
        }),
        _ => Check::Pending(state.phase),
    }
}
