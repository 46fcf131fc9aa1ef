//! Storage provisioning verification for Kubernetes/OpenShift clusters
//!
//! For every schedulable node a volume claim is requested, an out-of-band
//! diagnostic command is dispatched against the node, and a node-pinned pod
//! mounting the claim is started. The per-node outcomes are aggregated into a
//! [`report::RunReport`].

pub mod claim;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod kube_utils;
pub mod nodes;
pub mod outcome;
pub mod poll;
pub mod report;
pub mod storage_class;
pub mod target;
pub mod verifier;
pub mod workload;

pub use client::{ClusterClient, KubeClusterClient};
pub use config::VerifyConfig;
pub use diagnostics::{CommandExecutor, ProcessExecutor};
pub use error::Error;
pub use report::RunReport;
pub use verifier::ProvisioningVerifier;

#[cfg(test)]
pub use client::MockClusterClient;
#[cfg(test)]
pub use diagnostics::MockCommandExecutor;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "fcprobe";

/// Default namespace holding every claim and pod created by a run
pub const DEFAULT_TEST_NAMESPACE: &str = "fc-storage-test";

/// Standard Kubernetes label for the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] for resources created by fcprobe
pub const LABEL_MANAGED_BY_FCPROBE: &str = "fcprobe";

/// Annotation recording which node a claim or pod was created for
pub const ANNOTATION_TARGET_NODE: &str = "fcprobe.io/target-node";
