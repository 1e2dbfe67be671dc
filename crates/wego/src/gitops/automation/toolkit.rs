//! Reads a cluster's existing Flux bootstrap (`gotk-sync.yaml`) to decide
//! where the engine's own manifests go.

use serde::{Deserialize, Serialize};

use super::manifests::gitops_manifests;
use crate::gitops::application::{File, KUSTOMIZE_CONFIG_API_VERSION};
use crate::gitops::error::{GitOpsError, Result};
use crate::gitops::layout::KUSTOMIZATION_FILENAME;
use crate::gitops::resource::{GitRepository, Kustomization};

const GOTK_SYNC_FILENAME: &str = "gotk-sync.yaml";
const SYSTEM_DIR: &str = "system";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolkitKustomization {
    api_version: &'static str,
    kind: &'static str,
    resources: Vec<&'static str>,
}

/// The sync objects of a bootstrapped cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct GitopsToolkit {
    pub cluster_name: String,
    /// `<sync kustomization path>/system`
    pub system_path: String,
    sync_repository: Option<GitRepository>,
    sync_kustomization: Kustomization,
}

impl GitopsToolkit {
    /// Parses the `gotk-sync.yaml` among `files`.
    ///
    /// The cluster name is the last segment of the sync kustomization's
    /// path, or the kustomization's own name when the path is the root.
    pub fn from_files(files: &[File]) -> Result<Self> {
        if files.is_empty() {
            return Err(GitOpsError::NoToolkitFiles);
        }

        let mut sync_repository = None;
        let mut sync_kustomization = None;

        for file in files.iter().filter(|f| f.path.ends_with(GOTK_SYNC_FILENAME)) {
            let decode = |e: serde_yaml::Error| GitOpsError::Decode {
                path: file.path.clone(),
                message: e.to_string(),
            };

            for document in serde_yaml::Deserializer::from_slice(&file.data) {
                let value = serde_yaml::Value::deserialize(document).map_err(decode)?;
                match value.get("kind").and_then(|k| k.as_str()) {
                    Some("GitRepository") => {
                        let repository: GitRepository =
                            serde_yaml::from_value(value).map_err(decode)?;
                        sync_repository = Some(repository);
                    }
                    Some("Kustomization") => {
                        let kustomization: Kustomization =
                            serde_yaml::from_value(value).map_err(decode)?;
                        sync_kustomization = Some(kustomization);
                    }
                    _ => {}
                }
            }
        }

        let sync_kustomization = sync_kustomization.ok_or(GitOpsError::NoToolkitFiles)?;

        let base = sync_kustomization
            .spec
            .path
            .trim_start_matches("./")
            .trim_matches('/');
        let base = if base == "." { "" } else { base };

        let system_path = if base.is_empty() {
            SYSTEM_DIR.to_string()
        } else {
            format!("{}/{}", base, SYSTEM_DIR)
        };
        let cluster_name = match base.rsplit('/').next() {
            Some(last) if !last.is_empty() => last.to_string(),
            _ => sync_kustomization.metadata.name.clone(),
        };

        Ok(Self {
            cluster_name,
            system_path,
            sync_repository,
            sync_kustomization,
        })
    }

    /// Namespace the sync source lives in, falling back to the sync
    /// kustomization's namespace.
    pub fn namespace(&self) -> &str {
        self.sync_repository
            .as_ref()
            .map(|r| r.metadata.namespace.as_str())
            .filter(|ns| !ns.is_empty())
            .unwrap_or(self.sync_kustomization.metadata.namespace.as_str())
    }

    /// The aggregating manifest placed in the system path.
    pub fn files(&self) -> Result<Vec<File>> {
        let kustomization = ToolkitKustomization {
            api_version: KUSTOMIZE_CONFIG_API_VERSION,
            kind: "Kustomization",
            resources: vec!["./gitops/app", "./gitops/runtime"],
        };
        let path = format!("{}/{}", self.system_path, KUSTOMIZATION_FILENAME);
        let data = serde_yaml::to_string(&kustomization).map_err(|e| GitOpsError::Marshal {
            app: self.cluster_name.clone(),
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(vec![File::new(path, data)])
    }

    /// App and runtime manifests plus the aggregating manifest, ready to be
    /// committed in one batch.
    pub fn install_files(&self, app_version: &str) -> Result<Vec<File>> {
        let mut files = gitops_manifests(&self.system_path, self.namespace(), app_version)?;
        files.extend(self.files()?);
        Ok(files)
    }
}
