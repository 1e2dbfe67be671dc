//! Applies file batches to a working copy as single commits.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tracing::Instrument;

use super::auth::build_auth_env;
use super::cache::RepositoryHandle;
use super::repository::remove_if_present;
use super::types::{CommitIdentity, CommitOutcome};
use crate::config::{GitAuthSettings, GitSettings};
use crate::gitops::application::{ChangeSet, File};
use crate::gitops::error::{GitOpsError, Result};

/// Writes, stages, commits, and optionally pushes batches of files.
///
/// Calls on the same handle must not overlap; the writer does not lock the
/// working tree.
#[derive(Debug, Clone)]
pub struct GitWriter {
    identity: CommitIdentity,
    auth: GitAuthSettings,
    push: bool,
    push_timeout: Duration,
}

impl Default for GitWriter {
    fn default() -> Self {
        Self::new(CommitIdentity::default())
    }
}

impl GitWriter {
    /// A writer that commits with `identity` and does not push.
    pub fn new(identity: CommitIdentity) -> Self {
        Self {
            identity,
            auth: GitAuthSettings::default(),
            push: false,
            push_timeout: GitSettings::default().push_timeout(),
        }
    }

    pub fn from_settings(settings: &GitSettings) -> Self {
        Self {
            identity: CommitIdentity::from(settings),
            auth: settings.auth.clone(),
            push: settings.push,
            push_timeout: settings.push_timeout(),
        }
    }

    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn with_auth(mut self, auth: GitAuthSettings) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    pub fn identity(&self) -> &CommitIdentity {
        &self.identity
    }

    /// Writes `files` and commits them.
    pub async fn commit(
        &self,
        handle: &RepositoryHandle,
        message: &str,
        files: &[File],
    ) -> Result<CommitOutcome> {
        self.write_batch(handle, message, files, &[]).await
    }

    /// Removes the paths of `files` and commits the removal.
    pub async fn commit_removal(
        &self,
        handle: &RepositoryHandle,
        message: &str,
        files: &[File],
    ) -> Result<CommitOutcome> {
        self.write_batch(handle, message, &[], files).await
    }

    /// Applies a change set as one commit.
    pub async fn apply(
        &self,
        handle: &RepositoryHandle,
        message: &str,
        changes: &ChangeSet,
    ) -> Result<CommitOutcome> {
        self.write_batch(handle, message, &changes.written, &changes.removed)
            .await
    }

    async fn write_batch(
        &self,
        handle: &RepositoryHandle,
        message: &str,
        written: &[File],
        removed: &[File],
    ) -> Result<CommitOutcome> {
        for file in written.iter().chain(removed) {
            validate_path(&file.path)?;
        }
        if written.is_empty() && removed.is_empty() {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let span = tracing::info_span!(
            "git_commit",
            branch = %handle.branch(),
            written = written.len(),
            removed = removed.len()
        );

        self.commit_staged(handle, message, written, removed)
            .instrument(span)
            .await
    }

    async fn commit_staged(
        &self,
        handle: &RepositoryHandle,
        message: &str,
        written: &[File],
        removed: &[File],
    ) -> Result<CommitOutcome> {
        let repo = handle.repository();
        let touched: Vec<&str> = written
            .iter()
            .chain(removed)
            .map(|f| f.path.as_str())
            .collect();

        let staged = stage_batch(handle, written, removed).and_then(|()| repo.has_staged_changes());
        let has_changes = match staged {
            Ok(has_changes) => has_changes,
            Err(e) => return Err(restore_after(handle, &touched, e)),
        };
        if !has_changes {
            tracing::info!("Nothing to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        if let Err(e) = repo.commit(message, &self.identity) {
            return Err(restore_after(handle, &touched, e));
        }
        let commit_id = repo.head_commit()?;
        tracing::info!(commit = %commit_id, "Committed");

        let pushed = if self.push {
            self.push(handle, &commit_id).await?;
            true
        } else {
            false
        };

        Ok(CommitOutcome::Committed {
            commit_id,
            pushed,
            committed_at: Utc::now(),
        })
    }

    async fn push(&self, handle: &RepositoryHandle, commit_id: &str) -> Result<()> {
        let wrap = |source: GitOpsError| match source {
            GitOpsError::PushConflict { .. } => source,
            other => GitOpsError::Push {
                commit_id: commit_id.to_string(),
                source: Box::new(GitOpsError::Remote {
                    remote: handle.remote().to_string(),
                    source: Box::new(other),
                }),
            },
        };

        let auth = build_auth_env(&self.auth).map_err(wrap)?;
        let result = handle
            .repository()
            .push(handle.branch(), commit_id, &auth, self.push_timeout)
            .await;
        drop(auth);

        result.map_err(wrap)?;
        tracing::info!(commit = %commit_id, "Pushed");
        Ok(())
    }
}

fn stage_batch(handle: &RepositoryHandle, written: &[File], removed: &[File]) -> Result<()> {
    let root = handle.working_dir();
    let repo = handle.repository();

    for file in written {
        let full = root.join(&file.path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GitOpsError::WriteFile {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&full, &file.data).map_err(|e| GitOpsError::WriteFile {
            path: full.clone(),
            source: e,
        })?;
        repo.stage(&file.path)?;
    }

    for file in removed {
        let full = root.join(&file.path);
        let existed = remove_if_present(&full).map_err(|e| GitOpsError::WriteFile {
            path: full.clone(),
            source: e,
        })?;
        if existed || repo.exists_in_head(&file.path)? {
            repo.stage(&file.path)?;
        }
    }

    Ok(())
}

/// Restores touched paths after a failed write and hands back the original
/// error, or `DirtyWorkingTree` when the restore itself fails.
fn restore_after(handle: &RepositoryHandle, touched: &[&str], err: GitOpsError) -> GitOpsError {
    match handle.repository().restore_paths(touched.iter().copied()) {
        Ok(()) => err,
        Err(restore_err) => {
            tracing::error!(error = %restore_err, "Failed to restore working tree");
            GitOpsError::DirtyWorkingTree(format!("{}; restore failed: {}", err, restore_err))
        }
    }
}

/// Rejects paths that could escape the working tree or touch git metadata.
pub fn validate_path(path: &str) -> Result<()> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || Path::new(path).is_absolute()
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == ".." || segment == ".git");

    if invalid {
        Err(GitOpsError::InvalidPath(path.to_string()))
    } else {
        Ok(())
    }
}
