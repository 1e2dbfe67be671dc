//! Generates the manifest bundle that onboards a cluster.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as TokioCommand;

use super::manifests::{render_wego_app, wego_config_map, TemplateParams, WegoConfig, APP_CRD};
use super::naming::{cluster_source_name, constrain_resource_name, repo_secret_name};
use super::repo_url::RepoUrl;
use crate::gitops::application::{AppKustomization, File, KUSTOMIZE_CONFIG_API_VERSION};
use crate::gitops::error::{GitOpsError, Result};
use crate::gitops::layout::Layout;
use crate::gitops::resource::{
    CrossNamespaceSourceReference, GitRepository, GitRepositoryRef, GitRepositorySpec,
    Kustomization, KustomizationSpec, LocalObjectReference, ObjectKey, ObjectMeta,
};

pub const APP_CRD_PATH: &str = "wego-system.yaml";
pub const RUNTIME_PATH: &str = "gitops-runtime.yaml";
pub const SOURCE_PATH: &str = "flux-source-resource.yaml";
pub const SYSTEM_KUSTOMIZATION_PATH: &str = "kustomization.yaml";
pub const SYSTEM_KUST_RESOURCE_PATH: &str = "flux-system-kustomization-resource.yaml";
pub const USER_KUST_RESOURCE_PATH: &str = "flux-user-kustomization-resource.yaml";
pub const WEGO_APP_PATH: &str = "wego-app.yaml";
pub const WEGO_CONFIG_PATH: &str = "wego-config.yaml";

const SOURCE_INTERVAL: &str = "30s";
const KUSTOMIZATION_INTERVAL: &str = "1m0s";

/// Visibility of the config repository on its git provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryVisibility {
    Public,
    Private,
    Internal,
}

/// Resolves facts about a repository from its git provider.
#[async_trait]
pub trait GitProviderClient: Send + Sync {
    async fn default_branch(&self, url: &RepoUrl) -> Result<String>;
}

/// A provider client that answers with a branch known up front.
#[derive(Debug, Clone)]
pub struct ConfiguredBranch(pub String);

#[async_trait]
impl GitProviderClient for ConfiguredBranch {
    async fn default_branch(&self, _url: &RepoUrl) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Produces the manifests of the reconciliation runtime.
#[async_trait]
pub trait RuntimeInstaller: Send + Sync {
    async fn install_manifests(&self, namespace: &str) -> Result<Vec<u8>>;
}

/// Runs `flux install --export` to produce runtime manifests.
#[derive(Debug, Clone)]
pub struct FluxCli {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for FluxCli {
    fn default() -> Self {
        Self::new("flux")
    }
}

impl FluxCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RuntimeInstaller for FluxCli {
    async fn install_manifests(&self, namespace: &str) -> Result<Vec<u8>> {
        let mut cmd = TokioCommand::new(&self.binary);
        cmd.args(["install", "--export", "--namespace", namespace])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                GitOpsError::Collaborator(format!(
                    "flux install timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| GitOpsError::Collaborator(format!("failed to run flux: {}", e)))?;

        if !output.status.success() {
            return Err(GitOpsError::Collaborator(format!(
                "flux install failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// Inputs for generating a cluster's automation.
#[derive(Debug, Clone)]
pub struct ClusterAutomationParams {
    pub cluster_name: String,
    pub config_url: RepoUrl,
    /// `None` asks the provider for the default branch.
    pub branch: Option<String>,
    pub namespace: String,
    pub visibility: RepositoryVisibility,
    pub create_namespace: bool,
    /// Version of the app image the manifests reference.
    pub version: String,
}

/// The generated manifests for one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAutomation {
    pub cluster_name: String,
    pub app_crd: File,
    pub gitops_runtime: File,
    pub source: File,
    pub system_kustomization: File,
    pub system_kust_resource: File,
    pub user_kust_resource: File,
    pub wego_app: File,
    pub wego_config: File,
}

impl ClusterAutomation {
    /// The manifests a cluster needs to become self-sufficient.
    pub fn bootstrap_manifests(&self) -> Vec<File> {
        vec![
            self.app_crd.clone(),
            self.wego_app.clone(),
            self.source.clone(),
            self.system_kust_resource.clone(),
            self.user_kust_resource.clone(),
            self.wego_config.clone(),
        ]
    }

    /// Every generated manifest.
    pub fn manifests(&self) -> Vec<File> {
        let mut files = self.bootstrap_manifests();
        files.push(self.gitops_runtime.clone());
        files.push(self.system_kustomization.clone());
        files
    }
}

/// Builds [`ClusterAutomation`] bundles.
#[derive(Clone)]
pub struct AutomationGenerator {
    provider: Arc<dyn GitProviderClient>,
    runtime: Arc<dyn RuntimeInstaller>,
    layout: Layout,
}

impl std::fmt::Debug for AutomationGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationGenerator")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl AutomationGenerator {
    pub fn new(provider: Arc<dyn GitProviderClient>, runtime: Arc<dyn RuntimeInstaller>) -> Self {
        Self {
            provider,
            runtime,
            layout: Layout::default(),
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Generates every manifest for `params.cluster_name`.
    ///
    /// Identical params produce byte-identical bundles.
    pub async fn generate_cluster_automation(
        &self,
        params: &ClusterAutomationParams,
    ) -> Result<ClusterAutomation> {
        let cluster = params.cluster_name.as_str();
        let namespace = params.namespace.as_str();

        let branch = match &params.branch {
            Some(branch) => branch.clone(),
            None => self.provider.default_branch(&params.config_url).await?,
        };
        let runtime = self.runtime.install_manifests(namespace).await?;

        let source_name = cluster_source_name(&params.config_url);
        let secret_ref = match params.visibility {
            RepositoryVisibility::Public => None,
            RepositoryVisibility::Private | RepositoryVisibility::Internal => {
                Some(repo_secret_name(&params.config_url))
            }
        };
        tracing::debug!(cluster, source = %source_name, branch = %branch, "Generating cluster automation");

        let marshal = |file: &str, e: serde_yaml::Error| GitOpsError::Marshal {
            app: cluster.to_string(),
            path: file.to_string(),
            message: e.to_string(),
        };

        let source = source_manifest(
            &source_name,
            namespace,
            &params.config_url,
            &branch,
            secret_ref,
        );
        let source = serde_yaml::to_string(&source).map_err(|e| marshal(SOURCE_PATH, e))?;

        let system_kust = kustomization_manifest(
            &constrain_resource_name(&format!("{}-system", cluster)),
            namespace,
            &source_name,
            &self.layout.system_dir(cluster),
        );
        let system_kust =
            serde_yaml::to_string(&system_kust).map_err(|e| marshal(SYSTEM_KUST_RESOURCE_PATH, e))?;

        let user_kust = kustomization_manifest(
            &constrain_resource_name(&format!("{}-user", cluster)),
            namespace,
            &source_name,
            &self.layout.user_dir(cluster),
        );
        let user_kust =
            serde_yaml::to_string(&user_kust).map_err(|e| marshal(USER_KUST_RESOURCE_PATH, e))?;

        let mut resources: Vec<String> = [
            APP_CRD_PATH,
            RUNTIME_PATH,
            SOURCE_PATH,
            SYSTEM_KUST_RESOURCE_PATH,
            USER_KUST_RESOURCE_PATH,
            WEGO_APP_PATH,
            WEGO_CONFIG_PATH,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        resources.sort();
        let system_kustomization = AppKustomization {
            api_version: KUSTOMIZE_CONFIG_API_VERSION.to_string(),
            kind: "Kustomization".to_string(),
            metadata: ObjectMeta::new(cluster, namespace),
            common_labels: Default::default(),
            resources,
        };
        let system_kustomization = serde_yaml::to_string(&system_kustomization)
            .map_err(|e| marshal(SYSTEM_KUSTOMIZATION_PATH, e))?;

        let wego_app = render_wego_app(&TemplateParams {
            namespace,
            app_version: &params.version,
            create_namespace: params.create_namespace,
        })?;
        let wego_config = wego_config_map(&WegoConfig {
            flux_namespace: namespace.to_string(),
            wego_namespace: namespace.to_string(),
        })?;

        let path = |file: &str| self.layout.system_file(cluster, file);
        Ok(ClusterAutomation {
            cluster_name: cluster.to_string(),
            app_crd: File::new(path(APP_CRD_PATH), APP_CRD),
            gitops_runtime: File::new(path(RUNTIME_PATH), runtime),
            source: File::new(path(SOURCE_PATH), source),
            system_kustomization: File::new(path(SYSTEM_KUSTOMIZATION_PATH), system_kustomization),
            system_kust_resource: File::new(path(SYSTEM_KUST_RESOURCE_PATH), system_kust),
            user_kust_resource: File::new(path(USER_KUST_RESOURCE_PATH), user_kust),
            wego_app: File::new(path(WEGO_APP_PATH), wego_app),
            wego_config: File::new(path(WEGO_CONFIG_PATH), wego_config),
        })
    }
}

fn source_manifest(
    name: &str,
    namespace: &str,
    url: &RepoUrl,
    branch: &str,
    secret_ref: Option<String>,
) -> GitRepository {
    GitRepository::new(
        ObjectKey::new(name, namespace),
        GitRepositorySpec {
            url: url.as_str().to_string(),
            interval: SOURCE_INTERVAL.to_string(),
            reference: Some(GitRepositoryRef {
                branch: Some(branch.to_string()),
                ..Default::default()
            }),
            secret_ref: secret_ref.map(|name| LocalObjectReference { name }),
            ..Default::default()
        },
    )
}

fn kustomization_manifest(name: &str, namespace: &str, source: &str, dir: &str) -> Kustomization {
    Kustomization::new(
        ObjectKey::new(name, namespace),
        KustomizationSpec {
            path: format!("./{}", dir),
            interval: KUSTOMIZATION_INTERVAL.to_string(),
            prune: true,
            source_ref: CrossNamespaceSourceReference {
                kind: "GitRepository".to_string(),
                name: source.to_string(),
                namespace: None,
            },
            ..Default::default()
        },
    )
}
