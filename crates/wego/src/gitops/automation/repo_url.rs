//! Parsing of config repository URLs.

use regex::Regex;
use std::sync::LazyLock;

use super::naming::normalize_name;
use crate::gitops::error::{GitOpsError, Result};

static RE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<scheme>https?|ssh)://(?:(?P<user>[^@/]+)@)?(?P<host>[^/:@]+)(?::\d+)?/(?P<path>.+)$")
        .unwrap()
});
static RE_SCP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<user>[^@/:]+)@(?P<host>[^:/]+):(?P<path>[^/].*)$").unwrap());

/// A parsed repository URL.
///
/// SCP-style addresses (`git@host:owner/repo.git`) are kept in their
/// equivalent `ssh://` form so the URL can be handed to source objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoUrl {
    url: String,
    provider: String,
    owner: String,
    repository_name: String,
}

impl RepoUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = |reason: &str| GitOpsError::InvalidRepoUrl {
            url: crate::sanitize::redact_repo_url(raw),
            reason: reason.to_string(),
        };

        let (url, host, path) = if let Some(caps) = RE_URL.captures(raw) {
            (raw.to_string(), caps["host"].to_string(), caps["path"].to_string())
        } else if let Some(caps) = RE_SCP.captures(raw) {
            let url = format!("ssh://{}@{}/{}", &caps["user"], &caps["host"], &caps["path"]);
            (url, caps["host"].to_string(), caps["path"].to_string())
        } else {
            return Err(invalid("expected https://, ssh:// or user@host:path"));
        };

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
            return Err(invalid("expected <owner>/<repository> path"));
        }
        let (repository_name, owner) = segments
            .split_last()
            .ok_or_else(|| invalid("missing repository name"))?;

        let host = host.to_lowercase();
        let provider = match host.as_str() {
            "github.com" => "github".to_string(),
            "gitlab.com" => "gitlab".to_string(),
            other => normalize_name(other),
        };

        Ok(Self {
            url,
            provider,
            owner: owner.join("/"),
            repository_name: repository_name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// `github`, `gitlab`, or the normalized host name.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Owner or group path; nested groups are joined with `/`.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }
}

impl std::str::FromStr for RepoUrl {
    type Err = GitOpsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}
