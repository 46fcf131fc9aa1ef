//! Claim binding: request a PersistentVolumeClaim for a target and wait for
//! it to bind.
//!
//! Requesting uses server-side apply, so running the binder twice for the same
//! target replaces the claim instead of failing with "already exists".

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{info, warn};

use crate::client::{ClaimState, ClusterClient};
use crate::config::ClaimConfig;
use crate::outcome::ClaimOutcome;
use crate::poll::{poll_until_ready, PollOutcome, Check};
use crate::target::VerificationTarget;
use crate::{ANNOTATION_TARGET_NODE, LABEL_MANAGED_BY, LABEL_MANAGED_BY_FCPROBE};

const PHASE_BOUND: &str = "Bound";
const PHASE_LOST: &str = "Lost";

/// Labels carried by every resource a run creates
pub(crate) fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        LABEL_MANAGED_BY.to_string(),
        LABEL_MANAGED_BY_FCPROBE.to_string(),
    )])
}

/// Metadata for a per-target resource
pub(crate) fn target_metadata(
    name: &str,
    namespace: &str,
    target: &VerificationTarget,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(managed_labels()),
        annotations: Some(BTreeMap::from([(
            ANNOTATION_TARGET_NODE.to_string(),
            target.node().to_string(),
        )])),
        ..Default::default()
    }
}

/// Build the claim requested for `target`
pub fn build_claim(
    target: &VerificationTarget,
    namespace: &str,
    storage_class: &str,
    config: &ClaimConfig,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: target_metadata(target.claim_name(), namespace, target),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![config.access_mode.clone()]),
            storage_class_name: Some(storage_class.to_string()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(config.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

/// Requests a claim per target and waits for it to bind
pub struct ClaimBinder {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    storage_class: String,
    config: ClaimConfig,
}

impl ClaimBinder {
    /// Create a binder provisioning from `storage_class` in `namespace`
    pub fn new(
        client: Arc<dyn ClusterClient>,
        namespace: impl Into<String>,
        storage_class: impl Into<String>,
        config: ClaimConfig,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            storage_class: storage_class.into(),
            config,
        }
    }

    /// Request the target's claim and poll until it binds or times out.
    ///
    /// Never fails: API errors become `NotFound` (creation) or are retried
    /// (polling).
    pub async fn bind(&self, target: &VerificationTarget) -> ClaimOutcome {
        let claim = build_claim(target, &self.namespace, &self.storage_class, &self.config);
        if let Err(e) = self.client.apply_claim(&self.namespace, &claim).await {
            warn!(
                node = %target.node(),
                phase = "claim",
                status = "NotFound",
                error = %e,
                "Failed to create claim"
            );
            return ClaimOutcome::not_found(target, Some(e.to_string()));
        }
        info!(
            node = %target.node(),
            claim = %target.claim_name(),
            class = %self.storage_class,
            size = %self.config.size,
            "Requested claim"
        );

        let client = Arc::clone(&self.client);
        let namespace = self.namespace.clone();
        let name = target.claim_name().to_string();
        let description = format!("claim {} to bind", name);

        let outcome = poll_until_ready(self.config.poll_policy(), &description, || {
            let client = Arc::clone(&client);
            let namespace = namespace.clone();
            let name = name.clone();
            async move { check_claim(client.get_claim(&namespace, &name).await, &name) }
        })
        .await;

        let outcome = match outcome {
            PollOutcome::Ready(Some(state)) if state.phase.as_deref() == Some(PHASE_BOUND) => {
                ClaimOutcome::bound(target, state.volume_name)
            }
            PollOutcome::Ready(Some(state)) => ClaimOutcome::unbound(target, state.phase),
            PollOutcome::Ready(None) => ClaimOutcome::not_found(
                target,
                Some("claim disappeared while waiting for it to bind".to_string()),
            ),
            PollOutcome::TimedOut { last_observed } => {
                ClaimOutcome::unbound(target, last_observed)
            }
        };

        if outcome.is_bound() {
            info!(
                node = %target.node(),
                volume = outcome.volume.as_deref().unwrap_or("unknown"),
                "Claim bound"
            );
        } else {
            warn!(
                node = %target.node(),
                phase = "claim",
                status = %outcome.status,
                last_phase = outcome.last_phase.as_deref().unwrap_or("unknown"),
                "Claim did not bind"
            );
        }
        outcome
    }
}

/// Classify one claim query. `Ready(None)` means the claim is gone.
fn check_claim(
    result: Result<Option<ClaimState>, crate::Error>,
    name: &str,
) -> Check<Option<ClaimState>> {
    match result {
        Ok(None) => Check::Ready(None),
        Ok(Some(state)) => match state.phase.as_deref() {
            Some(PHASE_BOUND) | Some(PHASE_LOST) => Check::Ready(Some(state)),
            phase => Check::Pending(phase.map(str::to_string)),
        },
        Err(e) => {
            warn!(claim = %name, error = %e, "Claim status query failed, retrying");
            Check::Pending(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClusterClient;
    use crate::outcome::ClaimStatus;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn target() -> VerificationTarget {
        VerificationTarget::new("n1").unwrap()
    }

    fn state(phase: &str, volume: Option<&str>) -> ClaimState {
        ClaimState {
            phase: Some(phase.to_string()),
            volume_name: volume.map(str::to_string),
        }
    }

    fn binder(mock: MockClusterClient) -> ClaimBinder {
        ClaimBinder::new(Arc::new(mock), "fc-storage-test", "fc-gold", ClaimConfig::default())
    }

    #[test]
    fn claim_manifest_has_class_size_and_access_mode() {
        let claim = build_claim(&target(), "fc-storage-test", "fc-gold", &ClaimConfig::default());
        assert_eq!(claim.metadata.name.as_deref(), Some("fc-test-pvc-n1"));
        assert_eq!(claim.metadata.namespace.as_deref(), Some("fc-storage-test"));
        let spec = claim.spec.unwrap();
        assert_eq!(spec.storage_class_name.as_deref(), Some("fc-gold"));
        assert_eq!(spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
        let requests = spec.resources.unwrap().requests.unwrap();
        assert_eq!(requests.get("storage"), Some(&Quantity("1Gi".to_string())));
        let labels = claim.metadata.labels.unwrap();
        assert_eq!(labels.get(LABEL_MANAGED_BY).map(String::as_str), Some("fcprobe"));
    }

    #[tokio::test(start_paused = true)]
    async fn binds_after_pending() {
        let polls = Arc::new(AtomicU32::new(0));
        let p = polls.clone();

        let mut mock = MockClusterClient::new();
        mock.expect_apply_claim().times(1).returning(|_, _| Ok(()));
        mock.expect_get_claim().returning(move |_, _| {
            if p.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(Some(state("Pending", None)))
            } else {
                Ok(Some(state("Bound", Some("pvc-abc"))))
            }
        });

        let outcome = binder(mock).bind(&target()).await;
        assert_eq!(outcome.status, ClaimStatus::Bound);
        assert_eq!(outcome.volume.as_deref(), Some("pvc-abc"));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_records_last_phase() {
        let mut mock = MockClusterClient::new();
        mock.expect_apply_claim().returning(|_, _| Ok(()));
        mock.expect_get_claim()
            .returning(|_, _| Ok(Some(state("Pending", None))));

        let outcome = binder(mock).bind(&target()).await;
        assert_eq!(outcome.status, ClaimStatus::Unbound);
        assert_eq!(outcome.last_phase.as_deref(), Some("Pending"));
        assert!(outcome.volume.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_claim_is_unbound_immediately() {
        let mut mock = MockClusterClient::new();
        mock.expect_apply_claim().returning(|_, _| Ok(()));
        mock.expect_get_claim()
            .times(1)
            .returning(|_, _| Ok(Some(state("Lost", None))));

        let outcome = binder(mock).bind(&target()).await;
        assert_eq!(outcome.status, ClaimStatus::Unbound);
        assert_eq!(outcome.last_phase.as_deref(), Some("Lost"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_claim_is_not_found() {
        let mut mock = MockClusterClient::new();
        mock.expect_apply_claim().returning(|_, _| Ok(()));
        mock.expect_get_claim().returning(|_, _| Ok(None));

        let outcome = binder(mock).bind(&target()).await;
        assert_eq!(outcome.status, ClaimStatus::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn creation_failure_is_not_found_without_polling() {
        let mut mock = MockClusterClient::new();
        mock.expect_apply_claim()
            .returning(|_, _| Err(Error::cluster_query("apply_claim", "quota exceeded")));
        mock.expect_get_claim().never();

        let outcome = binder(mock).bind(&target()).await;
        assert_eq!(outcome.status, ClaimStatus::NotFound);
        assert!(outcome.detail.unwrap().contains("quota exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn query_errors_are_retried() {
        let polls = Arc::new(AtomicU32::new(0));
        let p = polls.clone();

        let mut mock = MockClusterClient::new();
        mock.expect_apply_claim().returning(|_, _| Ok(()));
        mock.expect_get_claim().returning(move |_, _| {
            if p.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::cluster_query("get_claim", "connection reset"))
            } else {
                Ok(Some(state("Bound", Some("pvc-1"))))
            }
        });

        let outcome = binder(mock).bind(&target()).await;
        assert_eq!(outcome.status, ClaimStatus::Bound);
    }

    #[tokio::test(start_paused = true)]
    async fn binding_twice_yields_same_outcome() {
        let mut mock = MockClusterClient::new();
        mock.expect_apply_claim().times(2).returning(|_, _| Ok(()));
        mock.expect_get_claim()
            .returning(|_, _| Ok(Some(state("Bound", Some("pvc-abc")))));

        let binder = binder(mock);
        let first = binder.bind(&target()).await;
        let second = binder.bind(&target()).await;
        assert_eq!(first, second);
    }
}
