//! Cluster onboarding: naming, static manifests, and the generated bundle.

pub mod generator;
pub mod manifests;
pub mod naming;
pub mod repo_url;
pub mod toolkit;

pub use generator::{
    AutomationGenerator, ClusterAutomation, ClusterAutomationParams, ConfiguredBranch, FluxCli,
    GitProviderClient, RepositoryVisibility, RuntimeInstaller,
};
pub use naming::{cluster_source_name, constrain_resource_name, repo_secret_name};
pub use repo_url::RepoUrl;
pub use toolkit::GitopsToolkit;
