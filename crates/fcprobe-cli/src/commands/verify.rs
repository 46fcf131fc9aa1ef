//! Verify command - provision, diagnose and mount storage on every node

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use fcprobe_common::config::DefaultClassPolicy;
use fcprobe_common::kube_utils::create_client;
use fcprobe_common::{KubeClusterClient, ProcessExecutor, ProvisioningVerifier, RunReport, VerifyConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::format::render_report;
use super::{parse_duration, OutputFormat};
use crate::prompt::{AssumeYes, Confirm, StdinConfirm};
use crate::{Error, Result};

/// Arguments of a verification run
#[derive(Args, Debug, Default)]
pub struct VerifyArgs {
    /// StorageClass to provision from (default: the cluster default class)
    pub storage_class: Option<String>,

    /// Path to kubeconfig file (default: $FCPROBE_KUBECONFIG, then kube defaults)
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// JSON file with the verification policy (default: ~/.fcprobe/config.json)
    #[arg(long, env = "FCPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Namespace for test claims and pods
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Requested size of each test claim (e.g. 1Gi)
    #[arg(long)]
    pub claim_size: Option<String>,

    /// How long to wait for each claim to bind (e.g. 60s, 2m)
    #[arg(long, value_parser = parse_duration)]
    pub claim_timeout: Option<Duration>,

    /// How long to wait for each verification pod to run
    #[arg(long, value_parser = parse_duration)]
    pub workload_timeout: Option<Duration>,

    /// Only verify nodes matching this label selector
    #[arg(long)]
    pub node_selector: Option<String>,

    /// Container image of the verification pod
    #[arg(long)]
    pub image: Option<String>,

    /// Do not run the node diagnostic command
    #[arg(long)]
    pub skip_diagnostics: bool,

    /// What to do when several classes are marked default
    #[arg(long, value_enum)]
    pub default_class_policy: Option<ClassPolicyArg>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,

    /// Answer yes to every confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// `--default-class-policy` values
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ClassPolicyArg {
    /// Use the first default class after confirmation
    First,
    /// Fail when the default is ambiguous
    Reject,
}

impl From<ClassPolicyArg> for DefaultClassPolicy {
    fn from(arg: ClassPolicyArg) -> Self {
        match arg {
            ClassPolicyArg::First => DefaultClassPolicy::First,
            ClassPolicyArg::Reject => DefaultClassPolicy::Reject,
        }
    }
}

impl VerifyArgs {
    /// Layer command-line overrides on top of the loaded config
    pub fn apply(&self, config: &mut VerifyConfig) {
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(size) = &self.claim_size {
            config.claim.size = size.clone();
        }
        if let Some(timeout) = self.claim_timeout {
            config.claim.timeout_secs = timeout.as_secs();
        }
        if let Some(timeout) = self.workload_timeout {
            config.workload.timeout_secs = timeout.as_secs();
        }
        if let Some(selector) = &self.node_selector {
            config.node_selector = Some(selector.clone());
        }
        if let Some(image) = &self.image {
            config.workload.image = image.clone();
        }
        if self.skip_diagnostics {
            config.diagnostics.enabled = false;
        }
        if let Some(policy) = self.default_class_policy {
            config.default_class_policy = policy.into();
        }
    }
}

/// Run the verify command
pub async fn run(args: VerifyArgs, cancel: CancellationToken) -> Result<()> {
    let mut config = crate::config::load_verify_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let kubeconfig = crate::config::resolve_kubeconfig(args.kubeconfig.as_deref());
    let client = create_client(kubeconfig.as_deref(), args.context.as_deref()).await?;
    let verifier = ProvisioningVerifier::new(
        Arc::new(KubeClusterClient::new(client)),
        Arc::new(ProcessExecutor),
        config,
    );

    let confirm: Box<dyn Confirm> = if args.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirm::stdin())
    };

    let report = execute(
        &verifier,
        args.storage_class.as_deref(),
        confirm.as_ref(),
        &cancel,
    )
    .await?;
    println!("{}", render_report(&report, &args.output)?);

    // The report is out; cleanup problems no longer change the exit status
    if let Err(e) = offer_teardown(&verifier, confirm.as_ref()).await {
        warn!(error = %e, "Failed to clean up test resources");
    }
    Ok(())
}

/// Setup checks followed by the per-node run.
///
/// Nothing is created in the cluster until the class is resolved, the
/// operator has accepted an ambiguous default, and nodes are enumerated.
pub async fn execute(
    verifier: &ProvisioningVerifier,
    storage_class: Option<&str>,
    confirm: &dyn Confirm,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    verifier.check_access().await?;

    let resolution = verifier.resolve_storage_class(storage_class).await?;
    if resolution.is_ambiguous() {
        let question = format!(
            "Multiple default storage classes found (also: {}). Continue with '{}'?",
            resolution.alternatives.join(", "),
            resolution.name()
        );
        if !confirm.confirm(&question).await? {
            return Err(Error::Aborted(format!(
                "ambiguous default storage class, pass one explicitly (candidates: {}, {})",
                resolution.name(),
                resolution.alternatives.join(", ")
            )));
        }
    }

    let targets = verifier.enumerate_targets().await?;
    info!(
        count = targets.len(),
        storage_class = %resolution.name(),
        "Verifying nodes"
    );

    verifier.prepare_namespace().await?;
    Ok(verifier.run(resolution.name(), &targets, cancel).await?)
}

/// Ask whether to delete the test namespace; returns whether it was deleted
pub async fn offer_teardown(verifier: &ProvisioningVerifier, confirm: &dyn Confirm) -> Result<bool> {
    let namespace = &verifier.config().namespace;
    let question = format!(
        "Delete namespace '{}' with all test claims and pods?",
        namespace
    );
    if !confirm.confirm(&question).await? {
        info!(namespace = %namespace, "Keeping test resources");
        return Ok(false);
    }
    verifier.teardown().await?;
    info!(namespace = %namespace, "Deleted test resources");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fcprobe_common::client::{ClaimState, NodeInfo, PodState, StorageClassInfo};
    use fcprobe_common::diagnostics::{CommandOutput, CommandRequest};
    use fcprobe_common::{ClusterClient, CommandExecutor};
    use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};

    /// In-memory cluster where every claim binds and every pod runs
    struct FakeCluster {
        classes: Vec<StorageClassInfo>,
        nodes: Vec<NodeInfo>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeCluster {
        fn new(defaults: &[&str]) -> Self {
            Self {
                classes: defaults
                    .iter()
                    .map(|name| StorageClassInfo {
                        name: name.to_string(),
                        is_default: true,
                        provisioner: "csi.fc.example.com".to_string(),
                        binding_mode: Some("Immediate".to_string()),
                    })
                    .collect(),
                nodes: ["worker-1", "worker-2"]
                    .iter()
                    .map(|name| NodeInfo {
                        name: name.to_string(),
                        schedulable: true,
                    })
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClusterClient for FakeCluster {
        async fn server_version(&self) -> std::result::Result<String, fcprobe_common::Error> {
            Ok("v1.29.3".to_string())
        }

        async fn list_storage_classes(
            &self,
        ) -> std::result::Result<Vec<StorageClassInfo>, fcprobe_common::Error> {
            Ok(self.classes.clone())
        }

        async fn list_nodes(
            &self,
            _label_selector: Option<String>,
        ) -> std::result::Result<Vec<NodeInfo>, fcprobe_common::Error> {
            Ok(self.nodes.clone())
        }

        async fn ensure_namespace(&self, name: &str) -> std::result::Result<(), fcprobe_common::Error> {
            self.record(format!("ensure_namespace {}", name));
            Ok(())
        }

        async fn delete_namespace(&self, name: &str) -> std::result::Result<(), fcprobe_common::Error> {
            self.record(format!("delete_namespace {}", name));
            Ok(())
        }

        async fn apply_claim(
            &self,
            _namespace: &str,
            claim: &PersistentVolumeClaim,
        ) -> std::result::Result<(), fcprobe_common::Error> {
            let name = claim.metadata.name.clone().unwrap_or_default();
            self.record(format!("apply_claim {}", name));
            Ok(())
        }

        async fn get_claim(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> std::result::Result<Option<ClaimState>, fcprobe_common::Error> {
            Ok(Some(ClaimState {
                phase: Some("Bound".to_string()),
                volume_name: Some("pv-fake".to_string()),
            }))
        }

        async fn create_pod(
            &self,
            _namespace: &str,
            pod: &Pod,
        ) -> std::result::Result<(), fcprobe_common::Error> {
            let name = pod.metadata.name.clone().unwrap_or_default();
            self.record(format!("create_pod {}", name));
            Ok(())
        }

        async fn get_pod(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> std::result::Result<Option<PodState>, fcprobe_common::Error> {
            Ok(Some(PodState {
                phase: Some("Running".to_string()),
                failure_reason: None,
            }))
        }

        async fn delete_pod(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> std::result::Result<bool, fcprobe_common::Error> {
            Ok(false)
        }

        async fn pod_logs(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> std::result::Result<String, fcprobe_common::Error> {
            Ok("verification complete, idling\n".to_string())
        }
    }

    struct FakeExecutor;

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn run(
            &self,
            _request: &CommandRequest,
        ) -> std::result::Result<CommandOutput, fcprobe_common::Error> {
            Ok(CommandOutput {
                exit_code: Some(0),
                stdout: "port_state: Online\n".to_string(),
                stderr: String::new(),
            })
        }
    }

    /// Answers prompts from a script and remembers the questions
    struct Canned {
        answers: Mutex<VecDeque<bool>>,
        asked: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(answers: &[bool]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                asked: Mutex::new(Vec::new()),
            }
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Confirm for Canned {
        async fn confirm(&self, question: &str) -> Result<bool> {
            self.asked.lock().unwrap().push(question.to_string());
            Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
        }
    }

    fn verifier(cluster: Arc<FakeCluster>, config: VerifyConfig) -> ProvisioningVerifier {
        ProvisioningVerifier::new(cluster, Arc::new(FakeExecutor), config)
    }

    #[tokio::test(start_paused = true)]
    async fn single_default_runs_without_prompting() {
        let cluster = Arc::new(FakeCluster::new(&["fc-gold"]));
        let confirm = Canned::new(&[]);
        let v = verifier(cluster.clone(), VerifyConfig::default());

        let report = execute(&v, None, &confirm, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.storage_class, "fc-gold");
        assert_eq!(report.passed(), 2);
        assert!(confirm.asked().is_empty());
        assert_eq!(
            cluster.calls()[0],
            "ensure_namespace fc-storage-test".to_string()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn declined_ambiguous_default_aborts_before_mutation() {
        let cluster = Arc::new(FakeCluster::new(&["fc-gold", "fc-silver"]));
        let confirm = Canned::new(&[false]);
        let v = verifier(cluster.clone(), VerifyConfig::default());

        let err = execute(&v, None, &confirm, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Aborted(_)));
        assert_eq!(confirm.asked().len(), 1);
        assert!(confirm.asked()[0].contains("fc-silver"));
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_ambiguous_default_uses_first_class() {
        let cluster = Arc::new(FakeCluster::new(&["fc-gold", "fc-silver"]));
        let confirm = Canned::new(&[true]);
        let v = verifier(cluster, VerifyConfig::default());

        let report = execute(&v, None, &confirm, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.storage_class, "fc-gold");
    }

    #[tokio::test(start_paused = true)]
    async fn reject_policy_fails_without_prompting() {
        let cluster = Arc::new(FakeCluster::new(&["fc-gold", "fc-silver"]));
        let confirm = Canned::new(&[true]);
        let config = VerifyConfig {
            default_class_policy: DefaultClassPolicy::Reject,
            ..VerifyConfig::default()
        };

        let err = execute(&verifier(cluster, config), None, &confirm, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Verify(fcprobe_common::Error::AmbiguousDefaultClass { .. })
        ));
        assert!(confirm.asked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_explicit_class_is_a_setup_failure() {
        let cluster = Arc::new(FakeCluster::new(&["fc-gold"]));
        let v = verifier(cluster.clone(), VerifyConfig::default());

        let err = execute(&v, Some("fc-bronze"), &Canned::new(&[]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Verify(fcprobe_common::Error::ClassNotFound { .. })
        ));
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn teardown_only_after_confirmation() {
        let cluster = Arc::new(FakeCluster::new(&["fc-gold"]));
        let v = verifier(cluster.clone(), VerifyConfig::default());

        assert!(!offer_teardown(&v, &Canned::new(&[false])).await.unwrap());
        assert!(cluster.calls().is_empty());

        assert!(offer_teardown(&v, &Canned::new(&[true])).await.unwrap());
        assert_eq!(cluster.calls(), vec!["delete_namespace fc-storage-test"]);
    }

    #[test]
    fn flags_override_config_file() {
        let args = VerifyArgs {
            namespace: Some("fc-check".to_string()),
            claim_size: Some("10Gi".to_string()),
            claim_timeout: Some(Duration::from_secs(120)),
            workload_timeout: Some(Duration::from_secs(300)),
            node_selector: Some("node-role.kubernetes.io/worker".to_string()),
            skip_diagnostics: true,
            default_class_policy: Some(ClassPolicyArg::Reject),
            ..VerifyArgs::default()
        };
        let mut config = VerifyConfig::default();
        args.apply(&mut config);

        assert_eq!(config.namespace, "fc-check");
        assert_eq!(config.claim.size, "10Gi");
        assert_eq!(config.claim.timeout_secs, 120);
        assert_eq!(config.workload.timeout_secs, 300);
        assert_eq!(
            config.node_selector.as_deref(),
            Some("node-role.kubernetes.io/worker")
        );
        assert!(!config.diagnostics.enabled);
        assert_eq!(config.default_class_policy, DefaultClassPolicy::Reject);
        // Untouched values keep the file's settings
        assert_eq!(config.claim.access_mode, "ReadWriteOnce");
    }

    #[test]
    fn cli_parses_positional_class_and_durations() {
        use clap::Parser;

        let cli = crate::Cli::try_parse_from([
            "fcprobe",
            "fc-gold",
            "--claim-timeout",
            "2m",
            "-o",
            "json",
            "-y",
        ])
        .unwrap();
        assert_eq!(cli.verify.storage_class.as_deref(), Some("fc-gold"));
        assert_eq!(cli.verify.claim_timeout, Some(Duration::from_secs(120)));
        assert!(matches!(cli.verify.output, OutputFormat::Json));
        assert!(cli.verify.yes);
    }
}
