//! Shared Kubernetes helpers using kube-rs

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::Error;

/// Annotation marking the cluster default StorageClass
pub const DEFAULT_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";

/// Pre-GA spelling of [`DEFAULT_CLASS_ANNOTATION`], still set by some provisioners
pub const BETA_DEFAULT_CLASS_ANNOTATION: &str =
    "storageclass.beta.kubernetes.io/is-default-class";

/// Binding mode under which claims stay Pending until a pod consumes them
pub const WAIT_FOR_FIRST_CONSUMER: &str = "WaitForFirstConsumer";

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether the annotations mark a StorageClass as default
pub fn is_default_class(annotations: Option<&BTreeMap<String, String>>) -> bool {
    annotations.is_some_and(|a| {
        [DEFAULT_CLASS_ANNOTATION, BETA_DEFAULT_CLASS_ANNOTATION]
            .iter()
            .any(|key| a.get(*key).is_some_and(|v| v.eq_ignore_ascii_case("true")))
    })
}

/// Whether a kube error is a 404 from the API server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Create a kube client from an optional kubeconfig path and context with the
/// default timeouts.
///
/// Without a path, the config is inferred (`KUBECONFIG`, `~/.kube/config`,
/// or in-cluster).
pub async fn create_client(
    kubeconfig: Option<&Path>,
    context: Option<&str>,
) -> Result<Client, Error> {
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };

    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| Error::ClusterUnreachable {
                message: format!("failed to read kubeconfig {}: {}", path.display(), e),
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| Error::ClusterUnreachable {
                    message: format!("failed to load kubeconfig: {}", e),
                })?
        }
        None if context.is_some() => Config::from_kubeconfig(&options).await.map_err(|e| {
            Error::ClusterUnreachable {
                message: format!("failed to load kubeconfig: {}", e),
            }
        })?,
        None => Config::infer().await.map_err(|e| Error::ClusterUnreachable {
            message: format!("failed to infer config: {}", e),
        })?,
    };

    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| Error::ClusterUnreachable {
        message: format!("failed to create client: {}", e),
    })
}
