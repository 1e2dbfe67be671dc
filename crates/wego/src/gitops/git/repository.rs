//! Git working copy operations, run through the `git` CLI.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use super::auth::AuthEnv;
use super::parse::{format_git_error, is_push_rejection, rejection_summary};
use super::types::CommitIdentity;
use crate::gitops::error::{classify_git_error, GitOpsError, Result};

/// Output of a git command that talks to a remote.
#[derive(Debug)]
struct RemoteOutput {
    status: ExitStatus,
    stderr: String,
}

/// A local git working copy.
#[derive(Debug, Clone)]
pub struct GitRepository {
    repo_path: PathBuf,
}

impl GitRepository {
    /// Wraps an existing working copy.
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Initializes an empty repository whose first branch is `branch`.
    pub fn init(repo_path: impl Into<PathBuf>, branch: &str) -> Result<Self> {
        let repo = Self::new(repo_path);
        repo.run_checked(&["init", "-q"])?;
        repo.run_checked(&["symbolic-ref", "HEAD", &format!("refs/heads/{}", branch)])?;
        Ok(repo)
    }

    /// Clones exactly one branch of `url` into `dest`, without tags.
    ///
    /// The child process is killed if the deadline passes or the returned
    /// future is dropped.
    pub async fn clone_branch(
        url: &str,
        branch: &str,
        dest: &Path,
        auth: &AuthEnv,
        timeout: Duration,
    ) -> Result<Self> {
        let mut cmd = TokioCommand::new("git");
        cmd.args(["clone", "--single-branch", "--no-tags", "--branch", branch, "--", url])
            .arg(dest);
        for (key, value) in auth.iter() {
            cmd.env(key, value);
        }

        let output = run_remote(cmd, timeout).await?;
        if !output.status.success() {
            return Err(classify_git_error(&output.stderr));
        }
        Ok(Self::new(dest))
    }

    /// Returns the repository path.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Returns the full hash of HEAD.
    pub fn head_commit(&self) -> Result<String> {
        let output = self.run_checked(&["rev-parse", "HEAD"])?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Stages additions, modifications, and deletions under `path`.
    pub fn stage(&self, path: &str) -> Result<()> {
        self.run_checked(&["add", "-A", "--", path]).map(|_| ())
    }

    /// Returns true if the index differs from HEAD.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let output = self.run_git(&["diff", "--cached", "--quiet"])?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(GitOpsError::GitOperation(format_git_error(&output))),
        }
    }

    /// Records the index as a new commit.
    pub fn commit(&self, message: &str, identity: &CommitIdentity) -> Result<()> {
        let output = Command::new("git")
            .current_dir(&self.repo_path)
            .env("LC_ALL", "C")
            .envs(identity.env())
            .args(["commit", "-q", "--no-verify", "-m", message])
            .output()
            .map_err(|e| GitOpsError::GitOperation(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(GitOpsError::GitOperation(format_git_error(&output)))
        }
    }

    /// Returns true if `path` exists in HEAD.
    pub fn exists_in_head(&self, path: &str) -> Result<bool> {
        let output = self.run_git(&["cat-file", "-e", &format!("HEAD:{}", path)])?;
        Ok(output.status.success())
    }

    /// Restores `paths` in both index and working tree to their state at
    /// HEAD. Paths HEAD does not know are unstaged and deleted.
    pub fn restore_paths<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for path in paths {
            if self.exists_in_head(path)? {
                self.run_checked(&["checkout", "-q", "HEAD", "--", path])?;
            } else {
                self.run_checked(&["rm", "-q", "--cached", "--ignore-unmatch", "--", path])?;
                let full = self.repo_path.join(path);
                remove_if_present(&full).map_err(|e| GitOpsError::WriteFile {
                    path: full.clone(),
                    source: e,
                })?;
            }
        }
        Ok(())
    }

    /// Pushes HEAD to `branch` on `origin`.
    ///
    /// A refused non-fast-forward update is reported as `PushConflict`;
    /// `commit_id` is carried into the error so callers know what was left
    /// unpushed.
    pub async fn push(
        &self,
        branch: &str,
        commit_id: &str,
        auth: &AuthEnv,
        timeout: Duration,
    ) -> Result<()> {
        let mut cmd = TokioCommand::new("git");
        cmd.current_dir(&self.repo_path)
            .args(["push", "origin", &format!("HEAD:{}", branch)]);
        for (key, value) in auth.iter() {
            cmd.env(key, value);
        }

        let output = run_remote(cmd, timeout).await?;
        if output.status.success() {
            return Ok(());
        }
        if is_push_rejection(&output.stderr) {
            return Err(GitOpsError::PushConflict {
                branch: branch.to_string(),
                commit_id: commit_id.to_string(),
                message: rejection_summary(&output.stderr),
            });
        }
        Err(classify_git_error(&output.stderr))
    }

    /// Runs a git command in the repository directory.
    fn run_git(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .current_dir(&self.repo_path)
            .env("LC_ALL", "C")
            .args(args)
            .output()
            .map_err(|e| GitOpsError::GitOperation(e.to_string()))
    }

    /// Runs a git command and fails on a non-zero exit.
    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run_git(args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(GitOpsError::GitOperation(format_git_error(&output)))
        }
    }
}

/// Runs a network-bound git command under a deadline. Progress lines on
/// stderr are forwarded to the debug log as they arrive.
async fn run_remote(mut cmd: TokioCommand, timeout: Duration) -> Result<RemoteOutput> {
    cmd.env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| GitOpsError::GitOperation(e.to_string()))?;

    let stderr_pipe = child.stderr.take();
    let stdout_pipe = child.stdout.take();

    let run = async {
        let stderr_task = async {
            let mut collected = Vec::new();
            if let Some(stderr) = stderr_pipe {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "wego::git", "{}", line);
                    collected.push(line);
                }
            }
            collected
        };

        let stdout_task = async {
            if let Some(stdout) = stdout_pipe {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(_line)) = lines.next_line().await {}
            }
        };

        let (stderr_lines, ()) = tokio::join!(stderr_task, stdout_task);
        let status = child
            .wait()
            .await
            .map_err(|e| GitOpsError::GitOperation(e.to_string()))?;

        Ok::<_, GitOpsError>(RemoteOutput {
            status,
            stderr: stderr_lines.join("\n"),
        })
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(result) => result,
        Err(_) => Err(GitOpsError::GitTimeout(timeout.as_secs())),
    }
}

/// Removes a file, returning whether it was there. A path that cannot
/// exist, such as one below a regular file, counts as absent.
pub(crate) fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(_) if std::fs::symlink_metadata(path).is_err() => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_with_commit(dir: &Path) -> GitRepository {
        let repo = GitRepository::init(dir, "main").unwrap();
        std::fs::write(dir.join("README.md"), "# config\n").unwrap();
        repo.stage("README.md").unwrap();
        repo.commit("initial", &CommitIdentity::default()).unwrap();
        repo
    }

    #[test]
    fn test_commit_and_head() {
        let dir = TempDir::new().unwrap();
        let repo = init_with_commit(dir.path());

        assert_eq!(repo.head_commit().unwrap().len(), 40);
        assert!(!repo.has_staged_changes().unwrap());
        assert!(repo.exists_in_head("README.md").unwrap());
        assert!(!repo.exists_in_head("missing.yaml").unwrap());

        let author = Command::new("git")
            .current_dir(dir.path())
            .args(["log", "-1", "--format=%an <%ae>"])
            .output()
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&author.stdout).trim(),
            "Weave Gitops <weave-gitops@weave.works>"
        );
    }

    #[test]
    fn test_staged_changes_detected() {
        let dir = TempDir::new().unwrap();
        let repo = init_with_commit(dir.path());

        std::fs::write(dir.path().join("README.md"), "# changed\n").unwrap();
        repo.stage("README.md").unwrap();
        assert!(repo.has_staged_changes().unwrap());
    }

    #[test]
    fn test_restore_paths() {
        let dir = TempDir::new().unwrap();
        let repo = init_with_commit(dir.path());

        std::fs::write(dir.path().join("README.md"), "# changed\n").unwrap();
        std::fs::write(dir.path().join("new.yaml"), "a: 1\n").unwrap();
        repo.stage("README.md").unwrap();
        repo.stage("new.yaml").unwrap();

        repo.restore_paths(["README.md", "new.yaml", "never-existed.yaml"])
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("README.md")).unwrap(),
            "# config\n"
        );
        assert!(!dir.path().join("new.yaml").exists());
        assert!(!repo.has_staged_changes().unwrap());
    }

    #[test]
    fn test_restore_paths_below_a_file() {
        let dir = TempDir::new().unwrap();
        let repo = init_with_commit(dir.path());

        repo.restore_paths(["README.md/x.yaml"]).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("README.md")).unwrap(),
            "# config\n"
        );
    }

    #[test]
    fn test_remove_if_present() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.yaml");
        std::fs::write(&file, "a: 1\n").unwrap();

        assert!(remove_if_present(&file).unwrap());
        assert!(!remove_if_present(&file).unwrap());
        std::fs::write(&file, "a: 1\n").unwrap();
        assert!(!remove_if_present(&file.join("nested.yaml")).unwrap());
        assert!(remove_if_present(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_clone_unknown_branch_fails() {
        let remote = TempDir::new().unwrap();
        init_with_commit(remote.path());
        let dest = TempDir::new().unwrap();

        let url = remote.path().to_str().unwrap();
        let err = GitRepository::clone_branch(
            url,
            "does-not-exist",
            dest.path(),
            &AuthEnv::none(),
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GitOpsError::GitOperation(_)));
    }
}
