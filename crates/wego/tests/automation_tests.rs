//! Installing cluster automation into a config repository.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::TestHarness;
use wego::gitops::automation::{
    AutomationGenerator, ClusterAutomationParams, ConfiguredBranch, GitopsToolkit,
    RepositoryVisibility, RuntimeInstaller,
};
use wego::gitops::{File, Result};

struct StaticRuntime;

#[async_trait]
impl RuntimeInstaller for StaticRuntime {
    async fn install_manifests(&self, namespace: &str) -> Result<Vec<u8>> {
        Ok(format!("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n", namespace).into_bytes())
    }
}

#[tokio::test]
async fn test_install_cluster_automation() {
    let harness = TestHarness::new();
    let store = harness.store("main").await;

    let generator = AutomationGenerator::new(
        Arc::new(ConfiguredBranch("main".to_string())),
        Arc::new(StaticRuntime),
    );
    let params = ClusterAutomationParams {
        cluster_name: "dev".to_string(),
        config_url: "git@github.com:acme/fleet.git".parse().unwrap(),
        branch: None,
        namespace: "wego-system".to_string(),
        visibility: RepositoryVisibility::Private,
        create_namespace: true,
        version: "v0.6.0".to_string(),
    };
    let automation = generator.generate_cluster_automation(&params).await.unwrap();

    let installed = store.install(&automation, false).await.unwrap();
    assert!(installed.outcome.unwrap().is_committed());
    assert_eq!(harness.remote_log("main")[0], "Installed Weave GitOps in dev");

    for file in automation.manifests() {
        let pushed = harness
            .remote_file("main", &file.path)
            .unwrap_or_else(|| panic!("{} not pushed", file.path));
        assert_eq!(pushed.as_bytes(), file.data.as_slice());
    }

    // Regenerating the same bundle is a no-op.
    let again = generator.generate_cluster_automation(&params).await.unwrap();
    let outcome = store.install(&again, false).await.unwrap().outcome.unwrap();
    assert!(!outcome.is_committed());
}

#[tokio::test]
async fn test_install_toolkit_next_to_bootstrap() {
    let harness = TestHarness::new();
    let store = harness.store("main").await;

    let sync = "\
apiVersion: kustomize.toolkit.fluxcd.io/v1beta2
kind: Kustomization
metadata:
  name: flux-system
  namespace: flux-system
spec:
  interval: 10m0s
  path: ./clusters/prod
  prune: true
  sourceRef:
    kind: GitRepository
    name: flux-system
";
    let toolkit =
        GitopsToolkit::from_files(&[File::new("clusters/prod/flux-system/gotk-sync.yaml", sync)])
            .unwrap();

    let dry = store.install_toolkit(&toolkit, "v0.6.0", true).await.unwrap();
    assert!(dry.outcome.is_none());
    assert_eq!(dry.changes.written.len(), 3);

    store.install_toolkit(&toolkit, "v0.6.0", false).await.unwrap();
    assert_eq!(harness.remote_log("main")[0], "Installed Weave GitOps in prod");
    let kustomization = harness
        .remote_file("main", "clusters/prod/system/kustomization.yaml")
        .unwrap();
    assert!(kustomization.contains("./gitops/app"));
}
