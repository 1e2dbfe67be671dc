//! Branch-keyed cache of cloned working copies.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tempfile::TempDir;
use tracing::Instrument;

use super::auth::build_auth_env;
use super::repository::GitRepository;
use crate::config::{GitAuthSettings, GitSettings};
use crate::gitops::error::{GitOpsError, Result};
use crate::sanitize::{redact_path, redact_repo_url};

/// A cloned working copy of one branch.
///
/// Handles share ownership of the clone directory with the cache. The
/// directory is deleted once the cache entry is gone and every handle has
/// been dropped.
#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    dir: Arc<TempDir>,
    branch: String,
    remote: String,
    repository: GitRepository,
}

impl RepositoryHandle {
    /// Directory of the working copy.
    pub fn working_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Remote URL with credentials masked.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repository
    }
}

/// Clones remote branches into temporary directories and remembers them by
/// branch name.
///
/// Entries are keyed by branch only, so one cache must not be asked for the
/// same branch name of two different remotes.
#[derive(Debug)]
pub struct RepositoryCache {
    entries: Mutex<HashMap<String, RepositoryHandle>>,
    clone_timeout: Duration,
}

impl Default for RepositoryCache {
    fn default() -> Self {
        Self::new(GitSettings::default().clone_timeout())
    }
}

impl RepositoryCache {
    pub fn new(clone_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clone_timeout,
        }
    }

    pub fn from_settings(settings: &GitSettings) -> Self {
        Self::new(settings.clone_timeout())
    }

    /// Clones `branch` of `remote_url` into a fresh directory and caches it,
    /// replacing any previous entry for the branch.
    ///
    /// The clone runs without holding the lock; a failed clone leaves the
    /// cache untouched and its directory removed.
    pub async fn get(
        &self,
        auth: &GitAuthSettings,
        remote_url: &str,
        branch: &str,
    ) -> Result<RepositoryHandle> {
        let redacted = redact_repo_url(remote_url);
        let span = tracing::info_span!("git_clone", branch = %branch, remote = %redacted);

        self.clone_and_insert(auth, remote_url, branch, &redacted)
            .instrument(span)
            .await
    }

    async fn clone_and_insert(
        &self,
        auth: &GitAuthSettings,
        remote_url: &str,
        branch: &str,
        redacted: &str,
    ) -> Result<RepositoryHandle> {
        let wrap = |source: GitOpsError| GitOpsError::Remote {
            remote: redacted.to_string(),
            source: Box::new(source),
        };

        let dir = tempfile::Builder::new()
            .prefix("wego-")
            .tempdir()
            .map_err(|e| GitOpsError::FileOperation(format!("create clone directory: {}", e)))?;
        let auth_env = build_auth_env(auth).map_err(wrap)?;

        let repository =
            GitRepository::clone_branch(remote_url, branch, dir.path(), &auth_env, self.clone_timeout)
                .await
                .map_err(wrap)?;
        drop(auth_env);

        let handle = RepositoryHandle {
            dir: Arc::new(dir),
            branch: branch.to_string(),
            remote: redacted.to_string(),
            repository,
        };
        tracing::info!(dir = %redact_path(handle.working_dir()), "Cloned branch");

        self.lock().insert(branch.to_string(), handle.clone());
        Ok(handle)
    }

    /// Working directory of a previously cloned branch.
    pub fn working_directory(&self, branch: &str) -> Result<PathBuf> {
        self.handle(branch).map(|h| h.working_dir().to_path_buf())
    }

    /// Handle of a previously cloned branch.
    pub fn handle(&self, branch: &str) -> Result<RepositoryHandle> {
        self.lock()
            .get(branch)
            .cloned()
            .ok_or_else(|| GitOpsError::BranchNotCached(branch.to_string()))
    }

    /// Drops the entry for `branch`. Returns false if there was none.
    pub fn evict(&self, branch: &str) -> bool {
        let removed = self.lock().remove(branch);
        if removed.is_some() {
            tracing::debug!(branch, "Evicted cached working copy");
        }
        removed.is_some()
    }

    /// Drops every entry.
    pub fn evict_all(&self) {
        let drained: Vec<RepositoryHandle> = self.lock().drain().map(|(_, h)| h).collect();
        tracing::debug!(count = drained.len(), "Evicted all cached working copies");
    }

    /// Cached branch names in sorted order.
    pub fn cached_branches(&self) -> Vec<String> {
        let mut branches: Vec<String> = self.lock().keys().cloned().collect();
        branches.sort();
        branches
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RepositoryHandle>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
