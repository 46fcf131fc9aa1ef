//! StorageClass resolution
//!
//! An explicitly requested class must exist. Otherwise the cluster default is
//! used. When several classes carry the default annotation the choice is a
//! policy decision: `DefaultClassPolicy::First` picks the first class in API
//! order and surfaces the others as `alternatives` so the caller can ask the
//! operator; `DefaultClassPolicy::Reject` refuses to guess.

use serde::Serialize;
use tracing::{info, warn};

use crate::client::{ClusterClient, StorageClassInfo};
use crate::config::DefaultClassPolicy;
use crate::kube_utils::WAIT_FOR_FIRST_CONSUMER;
use crate::{Error, Result};

/// Where the resolved class came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ClassSource {
    /// Named by the operator
    Explicit,
    /// The cluster default
    Default,
}

/// Result of StorageClass resolution
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassResolution {
    /// Class to use for every claim
    pub class: StorageClassInfo,
    /// How it was chosen
    pub source: ClassSource,
    /// Other default-annotated classes that were passed over
    pub alternatives: Vec<String>,
}

impl ClassResolution {
    /// Class name
    pub fn name(&self) -> &str {
        &self.class.name
    }

    /// Whether the default was chosen among several candidates
    pub fn is_ambiguous(&self) -> bool {
        !self.alternatives.is_empty()
    }

    /// Whether claims of this class wait for a consumer before binding
    pub fn waits_for_consumer(&self) -> bool {
        self.class.binding_mode.as_deref() == Some(WAIT_FOR_FIRST_CONSUMER)
    }
}

/// Choose the class to provision with. Pure; see the module docs for policy.
pub fn resolve(
    explicit: Option<&str>,
    classes: &[StorageClassInfo],
    policy: DefaultClassPolicy,
) -> Result<ClassResolution> {
    if let Some(name) = explicit {
        let class = classes
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::ClassNotFound {
                name: name.to_string(),
                available: classes.iter().map(|c| c.name.clone()).collect(),
            })?;
        return Ok(ClassResolution {
            class: class.clone(),
            source: ClassSource::Explicit,
            alternatives: Vec::new(),
        });
    }

    let defaults: Vec<&StorageClassInfo> = classes.iter().filter(|c| c.is_default).collect();
    match defaults.as_slice() {
        [] => Err(Error::NoDefaultClass),
        [only] => Ok(ClassResolution {
            class: (*only).clone(),
            source: ClassSource::Default,
            alternatives: Vec::new(),
        }),
        [first, rest @ ..] => match policy {
            DefaultClassPolicy::First => Ok(ClassResolution {
                class: (*first).clone(),
                source: ClassSource::Default,
                alternatives: rest.iter().map(|c| c.name.clone()).collect(),
            }),
            DefaultClassPolicy::Reject => Err(Error::AmbiguousDefaultClass {
                candidates: defaults.iter().map(|c| c.name.clone()).collect(),
            }),
        },
    }
}

/// List classes from the cluster and resolve one
pub async fn resolve_storage_class(
    client: &dyn ClusterClient,
    explicit: Option<&str>,
    policy: DefaultClassPolicy,
) -> Result<ClassResolution> {
    let classes = client.list_storage_classes().await?;
    let resolution = resolve(explicit, &classes, policy)?;

    info!(
        class = %resolution.name(),
        provisioner = %resolution.class.provisioner,
        source = ?resolution.source,
        "Resolved storage class"
    );
    if resolution.is_ambiguous() {
        warn!(
            class = %resolution.name(),
            alternatives = %resolution.alternatives.join(", "),
            "Multiple default storage classes, using the first"
        );
    }
    if resolution.waits_for_consumer() {
        warn!(
            class = %resolution.name(),
            "Class uses WaitForFirstConsumer binding; claims may not bind before a pod mounts them"
        );
    }
    Ok(resolution)
}
