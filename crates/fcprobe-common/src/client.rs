//! Cluster client used by the verification pipeline
//!
//! Provides a trait-based abstraction over the handful of Kubernetes calls the
//! pipeline needs, allowing tests to mock cluster interactions while
//! production code uses kube-rs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Namespace, Node, PersistentVolumeClaim, Pod, PodStatus,
};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde::Serialize;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::kube_utils::{is_default_class, is_not_found};
use crate::{Error, FIELD_MANAGER, LABEL_MANAGED_BY, LABEL_MANAGED_BY_FCPROBE};

/// Container waiting reasons that will not resolve on their own
pub const TERMINAL_WAITING_REASONS: &[&str] = &[
    "ErrImagePull",
    "ImagePullBackOff",
    "CrashLoopBackOff",
    "CreateContainerError",
    "CreateContainerConfigError",
    "InvalidImageName",
];

/// StorageClass as seen by the resolver
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassInfo {
    /// Class name
    pub name: String,
    /// Annotated as the cluster default
    pub is_default: bool,
    /// Provisioner backing the class
    pub provisioner: String,
    /// `Immediate` or `WaitForFirstConsumer`
    pub binding_mode: Option<String>,
}

/// Node as seen by the enumerator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    /// Node name
    pub name: String,
    /// False when the node is cordoned
    pub schedulable: bool,
}

/// Observed claim state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimState {
    /// `Pending`, `Bound` or `Lost`
    pub phase: Option<String>,
    /// Bound PersistentVolume name
    pub volume_name: Option<String>,
}

/// Observed pod state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodState {
    /// Pod phase
    pub phase: Option<String>,
    /// Terminal container waiting reason, if any container is stuck
    pub failure_reason: Option<String>,
}

/// Trait abstracting the cluster operations of a verification run
///
/// This trait allows mocking the cluster in tests while using the real
/// Kubernetes client in production. Every method is a single bounded API
/// call; errors are API errors, never domain states.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// API server version, used to verify credentials work
    async fn server_version(&self) -> Result<String, Error>;

    /// All storage classes in API order
    async fn list_storage_classes(&self) -> Result<Vec<StorageClassInfo>, Error>;

    /// Nodes matching an optional label selector, in API order
    async fn list_nodes(&self, label_selector: Option<String>) -> Result<Vec<NodeInfo>, Error>;

    /// Create the namespace if missing (idempotent)
    async fn ensure_namespace(&self, name: &str) -> Result<(), Error>;

    /// Delete a namespace and everything in it
    async fn delete_namespace(&self, name: &str) -> Result<(), Error>;

    /// Create or replace a claim
    async fn apply_claim(&self, namespace: &str, claim: &PersistentVolumeClaim)
        -> Result<(), Error>;

    /// Current claim state, `None` if it does not exist
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<ClaimState>, Error>;

    /// Create a pod
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), Error>;

    /// Current pod state, `None` if it does not exist
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodState>, Error>;

    /// Delete a pod; returns whether it existed
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<bool, Error>;

    /// Logs of a pod's container
    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String, Error>;
}

/// Real cluster client backed by kube-rs
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn server_version(&self) -> Result<String, Error> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| Error::ClusterUnreachable {
                message: e.to_string(),
            })?;
        Ok(info.git_version)
    }

    async fn list_storage_classes(&self) -> Result<Vec<StorageClassInfo>, Error> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::cluster_query("list_storage_classes", e.to_string()))?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|sc| {
                let is_default = is_default_class(sc.metadata.annotations.as_ref());
                Some(StorageClassInfo {
                    name: sc.metadata.name?,
                    is_default,
                    provisioner: sc.provisioner,
                    binding_mode: sc.volume_binding_mode,
                })
            })
            .collect())
    }

    async fn list_nodes(&self, label_selector: Option<String>) -> Result<Vec<NodeInfo>, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let mut params = ListParams::default();
        if let Some(selector) = label_selector.as_deref() {
            params = params.labels(selector);
        }
        let list = api
            .list(&params)
            .await
            .map_err(|e| Error::cluster_query("list_nodes", e.to_string()))?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|node| {
                let unschedulable = node
                    .spec
                    .as_ref()
                    .and_then(|s| s.unschedulable)
                    .unwrap_or(false);
                Some(NodeInfo {
                    name: node.metadata.name?,
                    schedulable: !unschedulable,
                })
            })
            .collect())
    }

    async fn ensure_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let labels = BTreeMap::from([(
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_FCPROBE.to_string(),
        )]);
        let ns = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {
                "name": name,
                "labels": labels
            }
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&ns))
            .await
            .map_err(|e| Error::cluster_query("ensure_namespace", e.to_string()))?;
        debug!(namespace = %name, "Ensured test namespace");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(namespace = %name, "Deleted test namespace");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(Error::cluster_query("delete_namespace", e.to_string())),
        }
    }

    async fn apply_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), Error> {
        let name = claim
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::Internal("claim has no name".to_string()))?;
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(claim),
        )
        .await
        .map_err(|e| Error::cluster_query("apply_claim", e.to_string()))?;
        Ok(())
    }

    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<ClaimState>, Error> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(claim) => Ok(Some(ClaimState {
                phase: claim.status.and_then(|s| s.phase),
                volume_name: claim.spec.and_then(|s| s.volume_name),
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::cluster_query("get_claim", e.to_string())),
        }
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), pod)
            .await
            .map_err(|e| Error::cluster_query("create_pod", e.to_string()))?;
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodState>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(pod) => Ok(Some(pod_state(pod.status.as_ref()))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::cluster_query("get_pod", e.to_string())),
        }
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams {
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        };
        match api.delete(name, &params).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(Error::cluster_query("delete_pod", e.to_string())),
        }
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.logs(name, &LogParams::default())
            .await
            .map_err(|e| Error::cluster_query("pod_logs", e.to_string()))
    }
}

/// Reduce a pod status to its phase and the first terminal waiting reason
pub fn pod_state(status: Option<&PodStatus>) -> PodState {
    let Some(status) = status else {
        return PodState::default();
    };

    let failure_reason = status
        .container_statuses
        .iter()
        .flatten()
        .filter_map(|cs| cs.state.as_ref()?.waiting.as_ref()?.reason.as_deref())
        .find(|reason| TERMINAL_WAITING_REASONS.contains(reason))
        .map(str::to_string);

    PodState {
        phase: status.phase.clone(),
        failure_reason,
    }
}
