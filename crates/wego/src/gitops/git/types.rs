//! Pure data types for git operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GitSettings;

/// Author and committer identity for engine commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitIdentity {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        let git = GitSettings::default();
        Self {
            name: git.user_name,
            email: git.user_email,
        }
    }
}

impl From<&GitSettings> for CommitIdentity {
    fn from(settings: &GitSettings) -> Self {
        Self {
            name: settings.user_name.clone(),
            email: settings.user_email.clone(),
        }
    }
}

impl CommitIdentity {
    /// Environment that sets both author and committer.
    pub fn env(&self) -> [(&'static str, &str); 4] {
        [
            ("GIT_AUTHOR_NAME", self.name.as_str()),
            ("GIT_AUTHOR_EMAIL", self.email.as_str()),
            ("GIT_COMMITTER_NAME", self.name.as_str()),
            ("GIT_COMMITTER_EMAIL", self.email.as_str()),
        ]
    }
}

/// Result of applying files to a working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommitOutcome {
    /// A commit was created.
    #[serde(rename_all = "camelCase")]
    Committed {
        /// Full commit hash.
        commit_id: String,
        /// Whether the commit reached the remote.
        pushed: bool,
        /// When the commit was created.
        committed_at: DateTime<Utc>,
    },
    /// The files already matched HEAD; no commit was created.
    NothingToCommit,
}

impl CommitOutcome {
    /// Returns the commit hash, if a commit was created.
    pub fn commit_id(&self) -> Option<&str> {
        match self {
            CommitOutcome::Committed { commit_id, .. } => Some(commit_id),
            CommitOutcome::NothingToCommit => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}
