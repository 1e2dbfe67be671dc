//! Applications and the files they serialize to.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{GitOpsError, Result};
use super::layout::{Layout, APP_FILENAME};
use super::resource::{Component, ComponentKind, ObjectKey, ObjectMeta};

/// Prefix of every label and annotation the engine writes.
pub const LABEL_KEY: &str = "app.weave.works.gitops";

/// API version of the application descriptor.
pub const APPLICATION_API_VERSION: &str = "wego.weave.works/v1alpha1";

/// Kind of the application descriptor.
pub const APPLICATION_KIND: &str = "Application";

/// API version of aggregating manifests.
pub const KUSTOMIZE_CONFIG_API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";

/// Version recorded in the `app-version` annotation.
pub const APP_VERSION: &str = "v1beta1";

/// Returns `app.weave.works.gitops/<suffix>`.
pub fn gitops_label(suffix: &str) -> String {
    format!("{}/{}", LABEL_KEY, suffix)
}

/// A file to be written to, or removed from, the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Repository-relative, `/`-separated path.
    pub path: String,
    pub data: Vec<u8>,
}

impl File {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

/// Files written and removed by one mutation, committed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub written: Vec<File>,
    pub removed: Vec<File>,
}

impl ChangeSet {
    /// A change set that only writes files.
    pub fn write(files: Vec<File>) -> Self {
        Self {
            written: files,
            removed: Vec::new(),
        }
    }

    /// A change set that only removes files.
    pub fn remove(files: Vec<File>) -> Self {
        Self {
            written: Vec::new(),
            removed: files,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty()
    }

    /// All paths touched by the change set, writes first.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.written
            .iter()
            .chain(self.removed.iter())
            .map(|f| f.path.as_str())
    }
}

/// Spec of the application descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
}

/// The `app.yaml` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDescriptor {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApplicationSpec,
}

/// The `kustomization.yaml` document aggregating an application's files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppKustomization {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Identifies a component within an application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId {
    pub kind: ComponentKind,
    pub key: ObjectKey,
}

impl ComponentId {
    pub fn new(kind: ComponentKind, key: ObjectKey) -> Self {
        Self { kind, key }
    }
}

/// An application and the component objects it owns.
///
/// The aggregating manifest is derived from the descriptor and the current
/// component set every time files are produced; it is never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub description: String,
    pub display_name: String,
    components: BTreeMap<ComponentId, Component>,
    layout: Layout,
}

impl Application {
    /// Creates an application with a freshly generated id.
    pub fn create(
        name: impl Into<String>,
        namespace: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut app = Self::new(name);
        app.id = uuid::Uuid::new_v4().to_string();
        app.namespace = namespace.into();
        app.description = description.into();
        app
    }

    /// Creates an empty application with the given name and no id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            namespace: String::new(),
            description: String::new(),
            display_name: String::new(),
            components: BTreeMap::new(),
            layout: Layout::default(),
        }
    }

    /// Sets the layout the application's paths are computed with.
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the components in file order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Returns a component by kind and key.
    pub fn component(&self, kind: ComponentKind, key: &ObjectKey) -> Option<&Component> {
        self.components.get(&ComponentId::new(kind, key.clone()))
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Path of the application descriptor.
    pub fn descriptor_path(&self) -> String {
        self.layout.descriptor_path(&self.name)
    }

    /// Path of the aggregating manifest.
    pub fn manifest_path(&self) -> String {
        self.layout.manifest_path(&self.name)
    }

    /// Path of a component file.
    pub fn component_path(&self, component: &Component) -> String {
        self.layout
            .component_path(&self.name, &component.key(), component.kind())
    }

    /// The derived resources list: the descriptor first, then every component.
    pub fn resources(&self) -> Vec<String> {
        resources_for(self.components.values())
    }

    /// Builds the descriptor document.
    pub fn descriptor(&self) -> ApplicationDescriptor {
        ApplicationDescriptor {
            api_version: APPLICATION_API_VERSION.to_string(),
            kind: APPLICATION_KIND.to_string(),
            metadata: ObjectMeta::new(self.name.clone(), self.namespace.clone())
                .with_annotation(gitops_label("app-id"), self.id.clone()),
            spec: ApplicationSpec {
                description: self.description.clone(),
                display_name: self.display_name.clone(),
            },
        }
    }

    /// Builds the aggregating manifest for the current component set.
    pub fn kustomization(&self) -> AppKustomization {
        self.kustomization_with(self.resources())
    }

    fn kustomization_with(&self, resources: Vec<String>) -> AppKustomization {
        let metadata = ObjectMeta::new(self.name.clone(), self.namespace.clone())
            .with_annotation(gitops_label("app-id"), self.id.clone())
            .with_annotation(gitops_label("app-description"), self.description.clone())
            .with_annotation(gitops_label("app-version"), APP_VERSION);

        let mut common_labels = BTreeMap::new();
        common_labels.insert(gitops_label("app"), self.name.clone());

        AppKustomization {
            api_version: KUSTOMIZE_CONFIG_API_VERSION.to_string(),
            kind: "Kustomization".to_string(),
            metadata,
            common_labels,
            resources,
        }
    }

    /// Serializes the application: descriptor, aggregating manifest, then
    /// one file per component.
    pub fn files(&self) -> Result<Vec<File>> {
        let mut files = vec![self.descriptor_file()?, self.manifest_file(self.resources())?];
        for component in self.components.values() {
            files.push(self.component_file(component)?);
        }
        Ok(files)
    }

    /// Adds or replaces a component and returns the files that changed.
    ///
    /// Nothing is mutated unless every file serializes.
    pub fn add_component(&mut self, component: impl Into<Component>) -> Result<ChangeSet> {
        let component = component.into();
        let id = ComponentId::new(component.kind(), component.key());

        let path = self.component_path(&component);
        if let Some((clash, _)) = self
            .components
            .iter()
            .find(|(k, c)| **k != id && self.component_path(c) == path)
        {
            return Err(GitOpsError::AlreadyExists {
                kind: component.kind().to_string(),
                name: format!("{} (file {} already holds {})", component.key(), path, clash.key),
            });
        }

        let component_file = self.component_file(&component)?;
        let resources = {
            let others = self.components.iter().filter(|(k, _)| **k != id);
            let mut next: Vec<&Component> = others.map(|(_, c)| c).collect();
            next.push(&component);
            next.sort_by_key(|c| ComponentId::new(c.kind(), c.key()));
            resources_for(next)
        };
        let manifest = self.manifest_file(resources)?;

        self.components.insert(id, component);

        Ok(ChangeSet::write(vec![component_file, manifest]))
    }

    /// Removes a component and returns the files that changed. Removing a
    /// component that is not present yields an empty change set.
    pub fn remove_component(&mut self, kind: ComponentKind, key: &ObjectKey) -> Result<ChangeSet> {
        let id = ComponentId::new(kind, key.clone());
        let Some(existing) = self.components.get(&id) else {
            return Ok(ChangeSet::default());
        };

        let removed = File::new(self.component_path(existing), Vec::new());
        let resources = resources_for(
            self.components
                .iter()
                .filter(|(k, _)| **k != id)
                .map(|(_, c)| c),
        );
        let manifest = self.manifest_file(resources)?;

        self.components.remove(&id);

        Ok(ChangeSet {
            written: vec![manifest],
            removed: vec![removed],
        })
    }

    /// Inserts a component without producing files. Used when folding state
    /// read from a tree.
    pub(crate) fn insert_component(&mut self, component: Component) {
        let id = ComponentId::new(component.kind(), component.key());
        self.components.insert(id, component);
    }

    fn descriptor_file(&self) -> Result<File> {
        let path = self.descriptor_path();
        let data = serde_yaml::to_string(&self.descriptor()).map_err(|e| self.marshal_error(&path, e))?;
        Ok(File::new(path, data))
    }

    fn manifest_file(&self, resources: Vec<String>) -> Result<File> {
        let path = self.manifest_path();
        let data = serde_yaml::to_string(&self.kustomization_with(resources))
            .map_err(|e| self.marshal_error(&path, e))?;
        Ok(File::new(path, data))
    }

    fn component_file(&self, component: &Component) -> Result<File> {
        let path = self.component_path(component);
        let data = component.to_yaml().map_err(|e| self.marshal_error(&path, e))?;
        Ok(File::new(path, data))
    }

    fn marshal_error(&self, path: &str, err: serde_yaml::Error) -> GitOpsError {
        GitOpsError::Marshal {
            app: self.name.clone(),
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

fn resources_for<'a>(components: impl IntoIterator<Item = &'a Component>) -> Vec<String> {
    std::iter::once(format!("./{}", APP_FILENAME))
        .chain(components.into_iter().map(|c| format!("./{}", c.file_name())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitops::resource::{
        BucketSpec, GitRepository, GitRepositorySpec, Kustomization, KustomizationSpec, Bucket,
        CrossNamespaceSourceReference,
    };

    fn podinfo() -> Application {
        let mut app = Application::create("podinfo", "default", "demo");
        app.id = "836bac7a-cd97-476b-8989-0d66b5bb82c5".to_string();
        app
    }

    fn git_source(name: &str) -> GitRepository {
        GitRepository::new(
            ObjectKey::new(name, "default"),
            GitRepositorySpec {
                url: "https://github.com/stefanprodan/podinfo".to_string(),
                interval: "1m0s".to_string(),
                ..Default::default()
            },
        )
    }

    fn manifest_of(files: &[File]) -> AppKustomization {
        let file = files
            .iter()
            .find(|f| f.path.ends_with("/kustomization.yaml"))
            .expect("manifest present");
        serde_yaml::from_slice(&file.data).unwrap()
    }

    #[test]
    fn test_create_assigns_id() {
        let a = Application::create("a", "default", "");
        let b = Application::create("a", "default", "");
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_files_without_components() {
        let files = podinfo().files().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                ".weave-gitops/apps/podinfo/app.yaml",
                ".weave-gitops/apps/podinfo/kustomization.yaml"
            ]
        );
        assert_eq!(manifest_of(&files).resources, vec!["./app.yaml"]);
    }

    #[test]
    fn test_manifest_carries_identity() {
        let manifest = podinfo().kustomization();
        assert_eq!(manifest.metadata.namespace, "default");
        assert_eq!(
            manifest.metadata.annotations.get("app.weave.works.gitops/app-id"),
            Some(&"836bac7a-cd97-476b-8989-0d66b5bb82c5".to_string())
        );
        assert_eq!(
            manifest.metadata.annotations.get("app.weave.works.gitops/app-description"),
            Some(&"demo".to_string())
        );
        assert_eq!(
            manifest.metadata.annotations.get("app.weave.works.gitops/app-version"),
            Some(&"v1beta1".to_string())
        );
        assert_eq!(
            manifest.common_labels.get("app.weave.works.gitops/app"),
            Some(&"podinfo".to_string())
        );
    }

    #[test]
    fn test_files_are_deterministic() {
        let mut app = podinfo();
        app.add_component(git_source("b")).unwrap();
        app.add_component(git_source("a")).unwrap();
        assert_eq!(app.files().unwrap(), app.files().unwrap());
    }

    #[test]
    fn test_add_component_returns_delta() {
        let mut app = podinfo();
        let delta = app.add_component(git_source("src")).unwrap();

        assert!(delta.removed.is_empty());
        assert_eq!(delta.written.len(), 2);
        assert_eq!(
            delta.written[0].path,
            ".weave-gitops/apps/podinfo/src-default-gitrepository.yaml"
        );
        assert_eq!(
            manifest_of(&delta.written).resources,
            vec!["./app.yaml", "./src-default-gitrepository.yaml"]
        );

        let files = app.files().unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(manifest_of(&files).resources, manifest_of(&delta.written).resources);
    }

    #[test]
    fn test_add_then_remove_restores_original() {
        let original = podinfo();
        let before = original.files().unwrap();

        let mut app = original.clone();
        app.add_component(git_source("src")).unwrap();
        let delta = app
            .remove_component(ComponentKind::GitRepository, &ObjectKey::new("src", "default"))
            .unwrap();

        assert_eq!(
            delta.removed[0].path,
            ".weave-gitops/apps/podinfo/src-default-gitrepository.yaml"
        );
        assert_eq!(manifest_of(&delta.written).resources, vec!["./app.yaml"]);
        assert_eq!(app.files().unwrap(), before);
    }

    #[test]
    fn test_remove_absent_component_is_noop() {
        let mut app = podinfo();
        let before = app.files().unwrap();
        let delta = app
            .remove_component(ComponentKind::Bucket, &ObjectKey::new("nope", "default"))
            .unwrap();
        assert!(delta.is_empty());
        assert_eq!(app.files().unwrap(), before);
    }

    #[test]
    fn test_add_component_rejects_file_name_clash() {
        let spec = || GitRepositorySpec {
            url: "https://github.com/stefanprodan/podinfo".to_string(),
            ..Default::default()
        };
        let mut app = podinfo();
        app.add_component(GitRepository::new(ObjectKey::new("a-b", "c"), spec()))
            .unwrap();
        let before = app.files().unwrap();

        // Both keys render as a-b-c-gitrepository.yaml.
        let err = app
            .add_component(GitRepository::new(ObjectKey::new("a", "b-c"), spec()))
            .unwrap_err();
        assert!(matches!(err, GitOpsError::AlreadyExists { .. }));
        assert_eq!(app.component_count(), 1);
        assert_eq!(app.files().unwrap(), before);

        // Replacing the owner of the file is still allowed.
        app.add_component(GitRepository::new(ObjectKey::new("a-b", "c"), spec()))
            .unwrap();
        assert_eq!(app.component_count(), 1);
    }

    #[test]
    fn test_resource_list_tracks_every_mutation() {
        let mut app = podinfo();
        let bucket = Bucket::new(
            ObjectKey::new("assets", "flux"),
            BucketSpec {
                bucket_name: "assets".to_string(),
                endpoint: "minio.local".to_string(),
                ..Default::default()
            },
        );
        let deploy = Kustomization::new(
            ObjectKey::new("deploy", "default"),
            KustomizationSpec {
                path: "./kustomize".to_string(),
                prune: true,
                source_ref: CrossNamespaceSourceReference {
                    kind: "GitRepository".to_string(),
                    name: "src".to_string(),
                    namespace: None,
                },
                ..Default::default()
            },
        );

        app.add_component(git_source("src")).unwrap();
        app.add_component(bucket).unwrap();
        app.add_component(deploy).unwrap();
        // Replacing an existing component keeps one entry.
        app.add_component(git_source("src")).unwrap();

        let expected = |app: &Application| -> Vec<String> {
            let mut v = vec!["./app.yaml".to_string()];
            v.extend(app.components().map(|c| format!("./{}", c.file_name())));
            v
        };

        assert_eq!(manifest_of(&app.files().unwrap()).resources, expected(&app));
        assert_eq!(app.component_count(), 3);

        app.remove_component(ComponentKind::Bucket, &ObjectKey::new("assets", "flux"))
            .unwrap();
        let resources = manifest_of(&app.files().unwrap()).resources;
        assert_eq!(resources, expected(&app));
        assert_eq!(
            resources,
            vec![
                "./app.yaml",
                "./src-default-gitrepository.yaml",
                "./deploy-default-kustomization.yaml"
            ]
        );
    }
}
