//! GitOps-specific error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading, generating or committing GitOps state.
#[derive(Error, Debug)]
pub enum GitOpsError {
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode '{path}': {message}")]
    Decode { path: String, message: String },

    #[error("Failed to marshal '{path}' for app '{app}': {message}")]
    Marshal {
        app: String,
        path: String,
        message: String,
    },

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: String, name: String },

    #[error("Invalid path for file {0}")]
    InvalidPath(String),

    #[error("Invalid repository URL '{url}': {reason}")]
    InvalidRepoUrl { url: String, reason: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Branch '{0}' has no cached working copy")]
    BranchNotCached(String),

    #[error("File operation failed: {0}")]
    FileOperation(String),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git network error: {0}")]
    GitNetworkError(String),

    #[error("Git operation timed out after {0}s")]
    GitTimeout(u64),

    #[error("Git merge conflict: {0}")]
    GitMergeConflict(String),

    #[error("Git authentication failed: {0}")]
    GitAuthFailed(String),

    #[error("Remote '{remote}': {source}")]
    Remote {
        remote: String,
        #[source]
        source: Box<GitOpsError>,
    },

    #[error("Push of {commit_id} to '{branch}' was rejected: {message}")]
    PushConflict {
        branch: String,
        commit_id: String,
        message: String,
    },

    #[error("Commit {commit_id} was created but could not be pushed: {source}")]
    Push {
        commit_id: String,
        #[source]
        source: Box<GitOpsError>,
    },

    #[error("Working tree left dirty after failed write: {0}")]
    DirtyWorkingTree(String),

    #[error("Failed to download artifact from {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to download artifact from {url}, status: {status}")]
    HttpStatus { url: String, status: String },

    #[error("Failed to read artifact entry '{entry}': {message}")]
    Artifact { entry: String, message: String },

    #[error("GitOps toolkit files not found")]
    NoToolkitFiles,

    #[error("{0}")]
    Collaborator(String),
}

impl From<serde_yaml::Error> for GitOpsError {
    fn from(err: serde_yaml::Error) -> Self {
        GitOpsError::Decode {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for GitOpsError {
    fn from(err: std::io::Error) -> Self {
        GitOpsError::FileOperation(err.to_string())
    }
}

/// Coarse classification used by callers to map errors onto user-facing
/// responses (404 for `NotFound`, 400 for `InvalidArgument`, 500 otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    BranchNotCached,
    Decode,
    Transport,
    Marshal,
    PushConflict,
    Internal,
}

impl GitOpsError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GitOpsError::NotFound { .. } => ErrorKind::NotFound,
            GitOpsError::InvalidPath(_)
            | GitOpsError::AlreadyExists { .. }
            | GitOpsError::InvalidRepoUrl { .. }
            | GitOpsError::InvalidSettings(_) => ErrorKind::InvalidArgument,
            GitOpsError::BranchNotCached(_) => ErrorKind::BranchNotCached,
            GitOpsError::Decode { .. } | GitOpsError::NoToolkitFiles => ErrorKind::Decode,
            GitOpsError::Marshal { .. } => ErrorKind::Marshal,
            GitOpsError::PushConflict { .. } => ErrorKind::PushConflict,
            GitOpsError::GitNetworkError(_)
            | GitOpsError::GitTimeout(_)
            | GitOpsError::GitAuthFailed(_)
            | GitOpsError::Remote { .. }
            | GitOpsError::Push { .. }
            | GitOpsError::Http { .. }
            | GitOpsError::HttpStatus { .. }
            | GitOpsError::Artifact { .. } => ErrorKind::Transport,
            GitOpsError::ReadFile { .. }
            | GitOpsError::WriteFile { .. }
            | GitOpsError::FileOperation(_)
            | GitOpsError::GitOperation(_)
            | GitOpsError::GitMergeConflict(_)
            | GitOpsError::DirtyWorkingTree(_)
            | GitOpsError::Collaborator(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            GitOpsError::GitNetworkError(_) | GitOpsError::GitTimeout(_) => true,
            GitOpsError::Remote { source, .. } | GitOpsError::Push { source, .. } => {
                source.is_retryable()
            }
            GitOpsError::Http { source, .. } => source.is_timeout() || source.is_connect(),
            _ => false,
        }
    }

    /// Returns true for not-found errors, which removal flows treat as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitOpsError::NotFound { .. })
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> GitOpsError {
    let lower = stderr.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return GitOpsError::GitNetworkError(stderr.trim().to_string());
    }

    if lower.contains("merge conflict") || lower.contains("conflict") && lower.contains("merge") {
        return GitOpsError::GitMergeConflict(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("could not read username")
    {
        return GitOpsError::GitAuthFailed(stderr.trim().to_string());
    }

    GitOpsError::GitOperation(stderr.trim().to_string())
}

/// Result type for GitOps operations.
pub type Result<T> = std::result::Result<T, GitOpsError>;
