//! Application operations against one cached working copy.

use serde::{Deserialize, Serialize};

use super::application::{Application, ChangeSet, File};
use super::automation::{ClusterAutomation, GitopsToolkit};
use super::error::{GitOpsError, Result};
use super::git::{CommitOutcome, GitWriter, RepositoryHandle};
use super::layout::Layout;
use super::reader::{walk_paths, ApplicationReader, DirSource};
use super::resource::{Component, ComponentKind, ObjectKey};

const APPLICATION: &str = "Application";

/// Caller intent for a new application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInput {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_name: String,
}

/// The result of a store mutation.
///
/// `outcome` is `None` for dry runs, where files are produced but never
/// handed to the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T> {
    pub value: T,
    pub changes: ChangeSet,
    pub outcome: Option<CommitOutcome>,
}

/// Reads and writes applications in a working copy.
///
/// Like the writer, the store does not serialize callers; one store per
/// working copy must be driven by one task at a time.
#[derive(Debug, Clone)]
pub struct AppStore {
    handle: RepositoryHandle,
    writer: GitWriter,
    layout: Layout,
}

impl AppStore {
    pub fn new(handle: RepositoryHandle, writer: GitWriter) -> Self {
        Self {
            handle,
            writer,
            layout: Layout::default(),
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Creates an application with a new id and commits its files.
    pub async fn create(&self, input: CreateInput, dry_run: bool) -> Result<Mutation<Application>> {
        validate_app_name(&input.name)?;
        if self.app_paths(&input.name)?.next().is_some() {
            return Err(GitOpsError::AlreadyExists {
                kind: APPLICATION.to_string(),
                name: input.name,
            });
        }

        let app = Application::create(input.name, input.namespace, input.description)
            .with_display_name(input.display_name)
            .with_layout(self.layout.clone());
        let changes = ChangeSet::write(app.files()?);

        let message = format!("Created new app: {}", app.name);
        let outcome = self.apply(&message, &changes, dry_run).await?;
        tracing::info!(app = %app.name, id = %app.id, dry_run, "Created app");

        Ok(Mutation {
            value: app,
            changes,
            outcome,
        })
    }

    /// Reads one application from the working tree.
    pub fn get(&self, name: &str) -> Result<Application> {
        validate_app_name(name)?;
        let paths: Vec<String> = self.app_paths(name)?.collect();

        let mut reader = ApplicationReader::new(self.layout.clone());
        reader.read(&self.source(), &paths)?;
        reader
            .finish()?
            .remove(name)
            .ok_or_else(|| GitOpsError::NotFound {
                kind: APPLICATION.to_string(),
                name: name.to_string(),
            })
    }

    /// Reads every application, sorted by name.
    pub fn list(&self) -> Result<Vec<Application>> {
        let paths = walk_paths(self.handle.working_dir())?;
        let mut reader = ApplicationReader::new(self.layout.clone());
        reader.read(&self.source(), &paths)?;
        Ok(reader.finish()?.into_values().collect())
    }

    /// Removes every file in the application's folder. A missing
    /// application is not an error and yields `None`.
    pub async fn remove(&self, name: &str, dry_run: bool) -> Result<Option<Mutation<Application>>> {
        let app = match self.get(name) {
            Ok(app) => app,
            Err(e) if e.is_not_found() => {
                tracing::debug!(app = %name, "App already absent");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let removed: Vec<File> = self
            .app_paths(name)?
            .map(|path| File::new(path, Vec::new()))
            .collect();
        let changes = ChangeSet::remove(removed);

        let message = format!("Removed app: {}", name);
        let outcome = self.apply(&message, &changes, dry_run).await?;
        tracing::info!(app = %name, dry_run, "Removed app");

        Ok(Some(Mutation {
            value: app,
            changes,
            outcome,
        }))
    }

    /// Adds or replaces a component of an existing application.
    pub async fn add_component(
        &self,
        app_name: &str,
        component: Component,
        dry_run: bool,
    ) -> Result<Mutation<Application>> {
        let mut app = self.get(app_name)?;
        let message = format!(
            "New {} {} in app {}",
            component.kind(),
            component.key().name,
            app_name
        );
        let changes = app.add_component(component)?;

        let outcome = self.apply(&message, &changes, dry_run).await?;
        Ok(Mutation {
            value: app,
            changes,
            outcome,
        })
    }

    /// Removes a component. Removing one the application does not own
    /// commits nothing.
    pub async fn remove_component(
        &self,
        app_name: &str,
        kind: ComponentKind,
        key: &ObjectKey,
        dry_run: bool,
    ) -> Result<Mutation<Application>> {
        let mut app = self.get(app_name)?;
        let changes = app.remove_component(kind, key)?;

        let message = format!("Removed {} {} from app {}", kind, key.name, app_name);
        let outcome = self.apply(&message, &changes, dry_run).await?;
        Ok(Mutation {
            value: app,
            changes,
            outcome,
        })
    }

    /// Commits a cluster's full automation bundle.
    pub async fn install(
        &self,
        automation: &ClusterAutomation,
        dry_run: bool,
    ) -> Result<Mutation<String>> {
        let changes = ChangeSet::write(automation.manifests());
        let message = format!("Installed Weave GitOps in {}", automation.cluster_name);
        let outcome = self.apply(&message, &changes, dry_run).await?;
        tracing::info!(cluster = %automation.cluster_name, dry_run, "Installed automation");

        Ok(Mutation {
            value: automation.cluster_name.clone(),
            changes,
            outcome,
        })
    }

    /// Commits the app and runtime manifests next to an existing Flux
    /// bootstrap.
    pub async fn install_toolkit(
        &self,
        toolkit: &GitopsToolkit,
        app_version: &str,
        dry_run: bool,
    ) -> Result<Mutation<String>> {
        let changes = ChangeSet::write(toolkit.install_files(app_version)?);
        let message = format!("Installed Weave GitOps in {}", toolkit.cluster_name);
        let outcome = self.apply(&message, &changes, dry_run).await?;

        Ok(Mutation {
            value: toolkit.cluster_name.clone(),
            changes,
            outcome,
        })
    }

    async fn apply(
        &self,
        message: &str,
        changes: &ChangeSet,
        dry_run: bool,
    ) -> Result<Option<CommitOutcome>> {
        if dry_run {
            return Ok(None);
        }
        self.writer
            .apply(&self.handle, message, changes)
            .await
            .map(Some)
    }

    fn source(&self) -> DirSource {
        DirSource::new(self.handle.working_dir())
    }

    /// Paths of every file in an application's folder, sorted.
    fn app_paths(&self, name: &str) -> Result<impl Iterator<Item = String>> {
        let prefix = format!("{}/", self.layout.app_root(name));
        let paths = walk_paths(self.handle.working_dir())?;
        Ok(paths.into_iter().filter(move |p| p.starts_with(&prefix)))
    }
}

fn validate_app_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(GitOpsError::InvalidPath(format!("invalid application name '{}'", name)));
    }
    Ok(())
}
