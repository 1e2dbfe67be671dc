//! Engine settings, loaded from a camelCase YAML document.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gitops::error::{GitOpsError, Result};
use crate::gitops::fetcher::DEFAULT_EXCLUSIONS;
use crate::gitops::layout::{Layout, BASE_DIR};

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Directory all engine-managed files live under.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    #[serde(default)]
    pub git: GitSettings,

    #[serde(default)]
    pub fetcher: FetcherSettings,
}

fn default_base_dir() -> String {
    BASE_DIR.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            git: GitSettings::default(),
            fetcher: FetcherSettings::default(),
        }
    }
}

/// Git repository and commit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSettings {
    /// Config repository URL.
    #[serde(default)]
    pub repository: String,

    /// Branch to clone and push.
    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub auth: GitAuthSettings,

    /// Author and committer name for engine commits.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Author and committer email for engine commits.
    #[serde(default = "default_user_email")]
    pub user_email: String,

    /// Push after every commit.
    #[serde(default = "default_true")]
    pub push: bool,

    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,

    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_user_name() -> String {
    "Weave Gitops".to_string()
}

fn default_user_email() -> String {
    "weave-gitops@weave.works".to_string()
}

fn default_true() -> bool {
    true
}

fn default_clone_timeout() -> u64 {
    120
}

fn default_push_timeout() -> u64 {
    60
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            repository: String::new(),
            branch: default_branch(),
            auth: GitAuthSettings::default(),
            user_name: default_user_name(),
            user_email: default_user_email(),
            push: true,
            clone_timeout_secs: default_clone_timeout(),
            push_timeout_secs: default_push_timeout(),
        }
    }
}

impl GitSettings {
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }
}

/// Git authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitAuthSettings {
    /// Authentication type: none, token, or ssh-key.
    #[serde(default, rename = "type")]
    pub auth_type: GitAuthType,

    /// Environment variable containing the token.
    #[serde(default)]
    pub token_env_var: String,

    /// Inline token. Stored in plaintext; prefer `tokenFile` or `tokenEnvVar`.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "token")]
    pub token_insecure: Option<String>,

    /// File containing the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,

    /// SSH private key. Defaults to `~/.ssh/id_ed25519`.
    #[serde(default)]
    pub ssh_key_path: String,
}

/// Git authentication type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GitAuthType {
    #[default]
    None,
    Token,
    SshKey,
}

/// Artifact download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetcherSettings {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Entry name suffixes skipped while extracting artifacts.
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_exclusions() -> Vec<String> {
    DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect()
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            exclusions: default_exclusions(),
        }
    }
}

impl FetcherSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Loads and validates settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GitOpsError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|e| GitOpsError::Decode {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// `<config dir>/wego/settings.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("wego").join("settings.yaml"))
    }

    /// Loads `path` when given. Otherwise loads the default file if it
    /// exists, falling back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(default) if default.exists() => Self::load(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.git.branch.trim().is_empty() {
            return Err(GitOpsError::InvalidSettings(
                "git.branch must not be empty".to_string(),
            ));
        }
        if self.git.clone_timeout_secs == 0 || self.git.push_timeout_secs == 0 {
            return Err(GitOpsError::InvalidSettings(
                "git timeouts must be greater than zero".to_string(),
            ));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(GitOpsError::InvalidSettings(
                "fetcher.timeoutSecs must be greater than zero".to_string(),
            ));
        }
        let token_source = crate::secrets::SecretSource {
            direct: self.git.auth.token_insecure.as_deref(),
            file: self.git.auth.token_file.as_deref(),
            env_var: Some(self.git.auth.token_env_var.as_str()),
        };
        if self.git.auth.auth_type == GitAuthType::Token && !token_source.is_configured() {
            return Err(GitOpsError::InvalidSettings(
                "git.auth type token needs token, tokenFile, or tokenEnvVar".to_string(),
            ));
        }
        Ok(())
    }

    /// Layout for the configured base directory.
    pub fn layout(&self) -> Layout {
        Layout::new(self.base_dir.clone())
    }
}
