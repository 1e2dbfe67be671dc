//! Test harness for git-backed integration tests.
//!
//! Every harness owns a temporary directory with a bare remote that has a
//! `main` and a `staging` branch, each holding a single README commit.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use wego::config::GitAuthSettings;
use wego::gitops::git::GitRepository;
use wego::gitops::{AppStore, CommitIdentity, GitWriter, RepositoryCache, RepositoryHandle};

/// Isolated remote plus a cache cloning from it.
pub struct TestHarness {
    temp_dir: TempDir,
    /// Path of the bare remote.
    pub remote: PathBuf,
    pub cache: RepositoryCache,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let remote = temp_dir.path().join("remote.git");
        git(temp_dir.path(), &["init", "-q", "--bare", "remote.git"]);

        let seed_dir = temp_dir.path().join("seed");
        std::fs::create_dir_all(&seed_dir).expect("Failed to create seed dir");
        let seed = GitRepository::init(&seed_dir, "main").expect("Failed to init seed repo");
        std::fs::write(seed_dir.join("README.md"), "# fleet\n").expect("Failed to write README");
        seed.stage("README.md").expect("Failed to stage README");
        seed.commit("Initial commit", &CommitIdentity::default())
            .expect("Failed to commit README");

        let remote_str = remote.to_str().expect("temp path is not UTF-8");
        git(&seed_dir, &["push", "-q", remote_str, "main:main"]);
        git(&seed_dir, &["push", "-q", remote_str, "main:staging"]);

        Self {
            temp_dir,
            remote,
            cache: RepositoryCache::default(),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn remote_url(&self) -> String {
        self.remote.to_string_lossy().into_owned()
    }

    /// Clones `branch` through the cache.
    pub async fn clone(&self, branch: &str) -> RepositoryHandle {
        self.cache
            .get(&GitAuthSettings::default(), &self.remote_url(), branch)
            .await
            .expect("Failed to clone branch")
    }

    /// A writer that pushes after each commit.
    pub fn writer(&self) -> GitWriter {
        GitWriter::default().with_push(true)
    }

    /// A store over a fresh clone of `branch` that pushes its commits.
    pub async fn store(&self, branch: &str) -> AppStore {
        AppStore::new(self.clone(branch).await, self.writer())
    }

    /// Commit subjects on the remote branch, newest first.
    pub fn remote_log(&self, branch: &str) -> Vec<String> {
        let out = git_output(&self.remote, &["log", "--format=%s", branch]);
        out.lines().map(str::to_string).collect()
    }

    /// Commit hash the remote branch points at.
    pub fn remote_head(&self, branch: &str) -> String {
        git_output(&self.remote, &["rev-parse", branch]).trim().to_string()
    }

    /// Contents of `path` on the remote branch, if present.
    pub fn remote_file(&self, branch: &str, path: &str) -> Option<String> {
        let output = Command::new("git")
            .current_dir(&self.remote)
            .args(["show", &format!("{}:{}", branch, path)])
            .output()
            .expect("Failed to run git show");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Branch checked out in a cached working copy.
    pub fn checked_out_branch(&self, handle: &RepositoryHandle) -> String {
        git_output(handle.working_dir(), &["rev-parse", "--abbrev-ref", "HEAD"])
            .trim()
            .to_string()
    }

    /// `git status --porcelain` of a cached working copy.
    pub fn status(&self, handle: &RepositoryHandle) -> String {
        git_output(handle.working_dir(), &["status", "--porcelain"])
    }

    /// Pushes a commit to `branch` from an unrelated clone, moving the
    /// remote ahead of any cached working copy.
    pub fn push_from_elsewhere(&self, branch: &str, path: &str, content: &str) {
        let dir = self.temp_dir.path().join(format!("elsewhere-{}", branch));
        if !dir.exists() {
            git(
                self.temp_dir.path(),
                &["clone", "-q", "--branch", branch, &self.remote_url(), dir.to_str().unwrap()],
            );
        } else {
            git(&dir, &["pull", "-q"]);
        }
        std::fs::write(dir.join(path), content).expect("Failed to write file");
        let repo = GitRepository::new(&dir);
        repo.stage(path).expect("Failed to stage");
        repo.commit(&format!("Edit {}", path), &CommitIdentity::default())
            .expect("Failed to commit");
        git(&dir, &["push", "-q", "origin", &format!("HEAD:{}", branch)]);
    }
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .current_dir(dir)
        .args(args)
        .status()
        .expect("Failed to run git");
    assert!(status.success(), "git {:?} failed", args);
}

fn git_output(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to run git");
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8_lossy(&output.stdout).into_owned()
}
