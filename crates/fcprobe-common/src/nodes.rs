//! Node enumeration

use tracing::{debug, info, warn};

use crate::client::ClusterClient;
use crate::target::VerificationTarget;
use crate::{Error, Result};

/// Names of schedulable (not cordoned) nodes in API order.
///
/// Fails with `NoSchedulableNodes` when nothing is left after filtering.
pub async fn schedulable_nodes(
    client: &dyn ClusterClient,
    label_selector: Option<&str>,
) -> Result<Vec<String>> {
    let nodes = client
        .list_nodes(label_selector.map(str::to_string))
        .await?;

    let (schedulable, cordoned): (Vec<_>, Vec<_>) =
        nodes.into_iter().partition(|node| node.schedulable);
    for node in &cordoned {
        debug!(node = %node.name, "Skipping unschedulable node");
    }

    if schedulable.is_empty() {
        return Err(Error::NoSchedulableNodes);
    }

    info!(
        count = schedulable.len(),
        cordoned = cordoned.len(),
        "Found schedulable nodes"
    );
    Ok(schedulable.into_iter().map(|node| node.name).collect())
}

/// Build a verification target for each schedulable node.
///
/// A node whose name cannot form claim and pod names is logged and left out;
/// `NoSchedulableNodes` is returned only when no node is left at all.
pub async fn enumerate_targets(
    client: &dyn ClusterClient,
    label_selector: Option<&str>,
) -> Result<Vec<VerificationTarget>> {
    let mut targets = Vec::new();
    for node in schedulable_nodes(client, label_selector).await? {
        match VerificationTarget::new(node.as_str()) {
            Ok(target) => targets.push(target),
            Err(e) => warn!(node = %node, error = %e, "Skipping node that cannot be verified"),
        }
    }

    if targets.is_empty() {
        return Err(Error::NoSchedulableNodes);
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockClusterClient, NodeInfo};
    use mockall::predicate::eq;

    fn node(name: &str, schedulable: bool) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            schedulable,
        }
    }

    #[tokio::test]
    async fn cordoned_nodes_are_excluded_in_order() {
        let mut mock = MockClusterClient::new();
        mock.expect_list_nodes().returning(|_| {
            Ok(vec![
                node("n3", true),
                node("n1", false),
                node("n2", true),
            ])
        });

        let nodes = schedulable_nodes(&mock, None).await.unwrap();
        assert_eq!(nodes, vec!["n3", "n2"]);
    }

    #[tokio::test]
    async fn all_cordoned_is_an_error() {
        let mut mock = MockClusterClient::new();
        mock.expect_list_nodes()
            .returning(|_| Ok(vec![node("n1", false)]));

        assert!(matches!(
            schedulable_nodes(&mock, None).await,
            Err(Error::NoSchedulableNodes)
        ));
    }

    #[tokio::test]
    async fn selector_is_passed_through() {
        let mut mock = MockClusterClient::new();
        mock.expect_list_nodes()
            .with(eq(Some("node-role.kubernetes.io/worker=".to_string())))
            .times(1)
            .returning(|_| Ok(vec![node("w1", true)]));

        let targets = enumerate_targets(&mock, Some("node-role.kubernetes.io/worker="))
            .await
            .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].claim_name(), "fc-test-pvc-w1");
    }

    #[tokio::test]
    async fn unusable_node_name_is_skipped_not_fatal() {
        let long = "n".repeat(250);
        let mut mock = MockClusterClient::new();
        let nodes = vec![node("w1", true), node(&long, true), node("w2", true)];
        mock.expect_list_nodes()
            .returning(move |_| Ok(nodes.clone()));

        let targets = enumerate_targets(&mock, None).await.unwrap();
        let names: Vec<&str> = targets.iter().map(|t| t.node()).collect();
        assert_eq!(names, vec!["w1", "w2"]);
    }

    #[tokio::test]
    async fn only_unusable_nodes_is_an_error() {
        let long = "n".repeat(250);
        let mut mock = MockClusterClient::new();
        mock.expect_list_nodes()
            .returning(move |_| Ok(vec![node(&long, true)]));

        assert!(matches!(
            enumerate_targets(&mock, None).await,
            Err(Error::NoSchedulableNodes)
        ));
    }

    #[tokio::test]
    async fn transient_query_failure_passes_through() {
        let mut mock = MockClusterClient::new();
        mock.expect_list_nodes()
            .returning(|_| Err(Error::cluster_query("list_nodes", "503")));

        assert!(matches!(
            enumerate_targets(&mock, None).await,
            Err(Error::ClusterQuery { .. })
        ));
    }
}
