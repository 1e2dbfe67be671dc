//! Reconstructs applications from a repository tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::application::{gitops_label, AppKustomization, Application, ApplicationDescriptor, File};
use super::error::{GitOpsError, Result};
use super::layout::{to_slash, AppPath, Layout};
use super::resource::{Component, ComponentKind};

/// A hierarchy of files addressed by repository-relative paths.
pub trait FileSource {
    /// Returns the contents of the file at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>>;
}

/// Files on disk below a root directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSource for DirSource {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path);
        fs::read(&full).map_err(|e| GitOpsError::ReadFile {
            path: full,
            source: e,
        })
    }
}

/// Files held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), data.into());
    }

    /// Returns every path in sorted order.
    pub fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

impl From<&[File]> for MemorySource {
    fn from(files: &[File]) -> Self {
        let mut source = Self::new();
        for file in files {
            source.insert(file.path.clone(), file.data.clone());
        }
        source
    }
}

impl FileSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| GitOpsError::ReadFile {
                path: PathBuf::from(path),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }
}

#[derive(Debug, Clone)]
struct Identity {
    path: String,
    id: String,
    namespace: String,
    description: String,
}

#[derive(Debug, Default)]
struct PartialApp {
    descriptor: Option<Identity>,
    display_name: String,
    manifest: Option<Identity>,
    components: Vec<Component>,
}

/// Folds files into applications. State accumulates across calls to
/// [`read`](Self::read) until [`finish`](Self::finish) is called.
#[derive(Debug)]
pub struct ApplicationReader {
    layout: Layout,
    apps: BTreeMap<String, PartialApp>,
}

impl Default for ApplicationReader {
    fn default() -> Self {
        Self::new(Layout::default())
    }
}

impl ApplicationReader {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            apps: BTreeMap::new(),
        }
    }

    /// Reads and folds every path from `source`. Paths outside the
    /// applications prefix are never opened.
    pub fn read<S, I, P>(&mut self, source: &S, paths: I) -> Result<()>
    where
        S: FileSource + ?Sized,
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        for path in paths {
            let path = path.as_ref();
            if matches!(self.classify(path)?, AppPath::Outside | AppPath::Other { .. }) {
                continue;
            }
            let data = source.read(path)?;
            self.read_file(path, &data)?;
        }
        Ok(())
    }

    /// Folds a single file given its raw bytes.
    pub fn read_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        if matches!(self.classify(path)?, AppPath::Outside | AppPath::Other { .. }) {
            return Ok(());
        }
        let value: serde_yaml::Value = serde_yaml::from_slice(data).map_err(|e| decode_error(path, e))?;
        self.read_value(path, value)
    }

    /// Folds a single file that has already been decoded.
    pub fn read_value(&mut self, path: &str, value: serde_yaml::Value) -> Result<()> {
        match self.classify(path)? {
            AppPath::Outside | AppPath::Other { .. } => {}
            AppPath::Descriptor { app } => {
                let descriptor: ApplicationDescriptor =
                    serde_yaml::from_value(value).map_err(|e| decode_error(path, e))?;
                let entry = self.apps.entry(app.to_string()).or_default();
                entry.display_name = descriptor.spec.display_name;
                entry.descriptor = Some(Identity {
                    path: path.to_string(),
                    id: annotation(&descriptor.metadata.annotations, "app-id"),
                    namespace: descriptor.metadata.namespace,
                    description: descriptor.spec.description,
                });
            }
            AppPath::Manifest { app } => {
                let manifest: AppKustomization =
                    serde_yaml::from_value(value).map_err(|e| decode_error(path, e))?;
                let entry = self.apps.entry(app.to_string()).or_default();
                entry.manifest = Some(Identity {
                    path: path.to_string(),
                    id: annotation(&manifest.metadata.annotations, "app-id"),
                    namespace: manifest.metadata.namespace,
                    description: annotation(&manifest.metadata.annotations, "app-description"),
                });
            }
            AppPath::Component { app, kind } => {
                let component = decode_component(path, kind, value)?;
                self.apps
                    .entry(app.to_string())
                    .or_default()
                    .components
                    .push(component);
            }
        }
        Ok(())
    }

    /// Builds the applications read so far, keyed by name.
    pub fn finish(self) -> Result<BTreeMap<String, Application>> {
        let mut out = BTreeMap::new();
        for (name, partial) in self.apps {
            let mut app = Application::new(name.clone()).with_layout(self.layout.clone());
            app.display_name = partial.display_name;

            let identity = match (partial.descriptor, partial.manifest) {
                (Some(descriptor), Some(manifest)) => {
                    check_agreement(&descriptor, &manifest)?;
                    Some(descriptor)
                }
                (descriptor, manifest) => descriptor.or(manifest),
            };
            if let Some(identity) = identity {
                app.id = identity.id;
                app.namespace = identity.namespace;
                app.description = identity.description;
            }

            for component in partial.components {
                app.insert_component(component);
            }
            out.insert(name, app);
        }
        Ok(out)
    }

    fn classify<'a>(&self, path: &'a str) -> Result<AppPath<'a>> {
        self.layout.classify(path).map_err(GitOpsError::InvalidPath)
    }
}

/// Reads the applications at `paths` from `source` with the default layout.
pub fn read_applications<S, I, P>(source: &S, paths: I) -> Result<BTreeMap<String, Application>>
where
    S: FileSource + ?Sized,
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    let mut reader = ApplicationReader::default();
    reader.read(source, paths)?;
    reader.finish()
}

/// Lists every file below `root` as a repository-relative, `/`-separated
/// path, skipping the `.git` directory. The result is sorted.
pub fn walk_paths(root: &Path) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git")
    {
        let entry = entry.map_err(|e| GitOpsError::FileOperation(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            paths.push(to_slash(relative));
        }
    }
    paths.sort();
    Ok(paths)
}

fn decode_component(path: &str, kind: ComponentKind, value: serde_yaml::Value) -> Result<Component> {
    let component = Component::from_value(kind, value).map_err(|e| decode_error(path, e))?;
    if component.key().name.is_empty() {
        return Err(GitOpsError::Decode {
            path: path.to_string(),
            message: "component has no metadata.name".to_string(),
        });
    }
    let expected = component.file_name();
    let actual = path.rsplit('/').next().unwrap_or(path);
    if actual != expected {
        return Err(GitOpsError::Decode {
            path: path.to_string(),
            message: format!(
                "{} {} belongs in {}, not {}",
                kind,
                component.key(),
                expected,
                actual
            ),
        });
    }
    Ok(component)
}

fn check_agreement(descriptor: &Identity, manifest: &Identity) -> Result<()> {
    let mismatch = |field: &str, a: &str, b: &str| GitOpsError::Decode {
        path: manifest.path.clone(),
        message: format!(
            "{} '{}' does not match '{}' in {}",
            field, b, a, descriptor.path
        ),
    };
    if descriptor.id != manifest.id {
        return Err(mismatch("app-id", &descriptor.id, &manifest.id));
    }
    if descriptor.namespace != manifest.namespace {
        return Err(mismatch("namespace", &descriptor.namespace, &manifest.namespace));
    }
    if descriptor.description != manifest.description {
        return Err(mismatch(
            "description",
            &descriptor.description,
            &manifest.description,
        ));
    }
    Ok(())
}

fn annotation(annotations: &BTreeMap<String, String>, suffix: &str) -> String {
    annotations
        .get(&gitops_label(suffix))
        .cloned()
        .unwrap_or_default()
}

fn decode_error(path: &str, err: serde_yaml::Error) -> GitOpsError {
    GitOpsError::Decode {
        path: path.to_string(),
        message: err.to_string(),
    }
}
