//! Flux-style resource types owned by applications.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API version of the Flux source objects.
pub const SOURCE_API_VERSION: &str = "source.toolkit.fluxcd.io/v1beta1";

/// API version of the Flux kustomization object.
pub const KUSTOMIZE_API_VERSION: &str = "kustomize.toolkit.fluxcd.io/v1beta2";

/// Name and namespace of an object. Used as a map key and as the suffix of
/// generated component file names.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub name: String,
    pub namespace: String,
}

impl ObjectKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The kind of a component object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    GitRepository,
    HelmRepository,
    Bucket,
    Kustomization,
}

impl ComponentKind {
    /// Returns the kind as written in the `kind` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::GitRepository => "GitRepository",
            ComponentKind::HelmRepository => "HelmRepository",
            ComponentKind::Bucket => "Bucket",
            ComponentKind::Kustomization => "Kustomization",
        }
    }

    /// Returns the API version objects of this kind are written with.
    pub fn api_version(&self) -> &'static str {
        match self {
            ComponentKind::Kustomization => KUSTOMIZE_API_VERSION,
            _ => SOURCE_API_VERSION,
        }
    }

    /// Lowercased kind, used as the last segment of a component file name.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            ComponentKind::GitRepository => "gitrepository",
            ComponentKind::HelmRepository => "helmrepository",
            ComponentKind::Bucket => "bucket",
            ComponentKind::Kustomization => "kustomization",
        }
    }

    /// Returns all component kinds.
    pub fn all() -> &'static [ComponentKind] {
        &[
            ComponentKind::GitRepository,
            ComponentKind::HelmRepository,
            ComponentKind::Bucket,
            ComponentKind::Kustomization,
        ]
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gitrepository" | "git" => Ok(ComponentKind::GitRepository),
            "helmrepository" | "helm" => Ok(ComponentKind::HelmRepository),
            "bucket" => Ok(ComponentKind::Bucket),
            "kustomization" => Ok(ComponentKind::Kustomization),
            _ => Err(format!("Unknown component kind: {}", s)),
        }
    }
}

/// Metadata for an object, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// The name of the object.
    pub name: String,

    /// The namespace of the object.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Key-value labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Key-value annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Creates metadata with a name and namespace.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Adds an annotation to the metadata.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Returns the object key of this metadata.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.name.clone(), self.namespace.clone())
    }
}

/// Marks a spec type with the component kind it belongs to.
pub trait ComponentSpec {
    const KIND: ComponentKind;
}

/// A generic Flux-style object wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxObject<T> {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: T,
}

impl<T: ComponentSpec> FluxObject<T> {
    /// Creates an object of the spec's kind.
    pub fn new(key: ObjectKey, spec: T) -> Self {
        Self {
            api_version: T::KIND.api_version().to_string(),
            kind: T::KIND.as_str().to_string(),
            metadata: ObjectMeta::new(key.name, key.namespace),
            spec,
        }
    }
}

impl<T> FluxObject<T> {
    /// Returns the name and namespace of the object.
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

/// Reference to a secret in the same namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalObjectReference {
    pub name: String,
}

/// Git reference a source tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepositoryRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// Spec of a `GitRepository` source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositorySpec {
    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,

    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<GitRepositoryRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<String>,

    /// Spec fields this crate does not model, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ComponentSpec for GitRepositorySpec {
    const KIND: ComponentKind = ComponentKind::GitRepository;
}

/// Spec of a `HelmRepository` source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositorySpec {
    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ComponentSpec for HelmRepositorySpec {
    const KIND: ComponentKind = ComponentKind::HelmRepository;
}

/// Spec of a `Bucket` source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSpec {
    pub bucket_name: String,

    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ComponentSpec for BucketSpec {
    const KIND: ComponentKind = ComponentKind::Bucket;
}

/// Source a kustomization reconciles from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossNamespaceSourceReference {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Spec of a Flux `Kustomization`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KustomizationSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,

    #[serde(default)]
    pub prune: bool,

    pub source_ref: CrossNamespaceSourceReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ComponentSpec for KustomizationSpec {
    const KIND: ComponentKind = ComponentKind::Kustomization;
}

pub type GitRepository = FluxObject<GitRepositorySpec>;
pub type HelmRepository = FluxObject<HelmRepositorySpec>;
pub type Bucket = FluxObject<BucketSpec>;
pub type Kustomization = FluxObject<KustomizationSpec>;

/// A component object owned by an application.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    GitSource(GitRepository),
    HelmSource(HelmRepository),
    BucketSource(Bucket),
    FluxKustomization(Kustomization),
}

impl Component {
    /// Returns the kind tag of the component.
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::GitSource(_) => ComponentKind::GitRepository,
            Component::HelmSource(_) => ComponentKind::HelmRepository,
            Component::BucketSource(_) => ComponentKind::Bucket,
            Component::FluxKustomization(_) => ComponentKind::Kustomization,
        }
    }

    /// Returns the name and namespace of the component.
    pub fn key(&self) -> ObjectKey {
        match self {
            Component::GitSource(o) => o.key(),
            Component::HelmSource(o) => o.key(),
            Component::BucketSource(o) => o.key(),
            Component::FluxKustomization(o) => o.key(),
        }
    }

    /// File name of the component inside its application folder.
    pub fn file_name(&self) -> String {
        component_file_name(&self.key(), self.kind())
    }

    /// Serializes the component payload to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        match self {
            Component::GitSource(o) => serde_yaml::to_string(o),
            Component::HelmSource(o) => serde_yaml::to_string(o),
            Component::BucketSource(o) => serde_yaml::to_string(o),
            Component::FluxKustomization(o) => serde_yaml::to_string(o),
        }
    }

    /// Decodes a component of the given kind from YAML bytes.
    pub fn from_yaml(kind: ComponentKind, data: &[u8]) -> Result<Self, serde_yaml::Error> {
        Ok(match kind {
            ComponentKind::GitRepository => Component::GitSource(serde_yaml::from_slice(data)?),
            ComponentKind::HelmRepository => Component::HelmSource(serde_yaml::from_slice(data)?),
            ComponentKind::Bucket => Component::BucketSource(serde_yaml::from_slice(data)?),
            ComponentKind::Kustomization => {
                Component::FluxKustomization(serde_yaml::from_slice(data)?)
            }
        })
    }

    /// Decodes a component of the given kind from an already decoded value.
    pub fn from_value(
        kind: ComponentKind,
        value: serde_yaml::Value,
    ) -> Result<Self, serde_yaml::Error> {
        Ok(match kind {
            ComponentKind::GitRepository => Component::GitSource(serde_yaml::from_value(value)?),
            ComponentKind::HelmRepository => Component::HelmSource(serde_yaml::from_value(value)?),
            ComponentKind::Bucket => Component::BucketSource(serde_yaml::from_value(value)?),
            ComponentKind::Kustomization => {
                Component::FluxKustomization(serde_yaml::from_value(value)?)
            }
        })
    }
}

impl From<GitRepository> for Component {
    fn from(value: GitRepository) -> Self {
        Component::GitSource(value)
    }
}

impl From<HelmRepository> for Component {
    fn from(value: HelmRepository) -> Self {
        Component::HelmSource(value)
    }
}

impl From<Bucket> for Component {
    fn from(value: Bucket) -> Self {
        Component::BucketSource(value)
    }
}

impl From<Kustomization> for Component {
    fn from(value: Kustomization) -> Self {
        Component::FluxKustomization(value)
    }
}

/// `<name>-<namespace>-<lowercased kind>.yaml`
pub fn component_file_name(key: &ObjectKey, kind: ComponentKind) -> String {
    format!("{}-{}-{}.yaml", key.name, key.namespace, kind.file_suffix())
}

/// Splits a component file name into the kind suffix it ends with.
/// Returns `None` for files that are not named after a known kind.
pub fn kind_from_file_name(file_name: &str) -> Option<ComponentKind> {
    let stem = file_name.strip_suffix(".yaml")?;
    ComponentKind::all().iter().copied().find(|kind| {
        stem.strip_suffix(kind.file_suffix())
            .is_some_and(|rest| rest.ends_with('-') && rest.len() > 1)
    })
}
