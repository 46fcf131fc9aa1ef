//! Verification targets: one per node under test

use serde::Serialize;

use crate::{Error, Result};

/// Prefix of the claim created for each node
pub const CLAIM_NAME_PREFIX: &str = "fc-test-pvc-";

/// Prefix of the verification pod created for each node
pub const POD_NAME_PREFIX: &str = "fc-test-pod-";

/// Maximum length of a DNS-1123 subdomain
const MAX_NAME_LEN: usize = 253;

/// A node under test with the names of the resources created for it.
///
/// Names are derived from the node name so targets never collide in the
/// shared test namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationTarget {
    node: String,
    claim_name: String,
    pod_name: String,
}

impl VerificationTarget {
    /// Build a target for `node`, rejecting names that are not valid
    /// resource names once prefixed.
    pub fn new(node: impl Into<String>) -> Result<Self> {
        let node = node.into();
        validate_node_name(&node)?;
        Ok(Self {
            claim_name: format!("{CLAIM_NAME_PREFIX}{node}"),
            pod_name: format!("{POD_NAME_PREFIX}{node}"),
            node,
        })
    }

    /// Node name
    pub fn node(&self) -> &str {
        &self.node
    }

    /// PersistentVolumeClaim name
    pub fn claim_name(&self) -> &str {
        &self.claim_name
    }

    /// Verification pod name
    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }
}

fn validate_node_name(node: &str) -> Result<()> {
    let invalid = |message: &str| Error::InvalidTarget {
        node: node.to_string(),
        message: message.to_string(),
    };

    if node.is_empty() {
        return Err(invalid("empty node name"));
    }
    if node.len() + CLAIM_NAME_PREFIX.len().max(POD_NAME_PREFIX.len()) > MAX_NAME_LEN {
        return Err(invalid("derived resource names would exceed 253 characters"));
    }
    let valid_chars = node
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if !valid_chars {
        return Err(invalid(
            "only lowercase alphanumerics, '-' and '.' are allowed",
        ));
    }
    if !node
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return Err(invalid("must end with an alphanumeric character"));
    }
    Ok(())
}
