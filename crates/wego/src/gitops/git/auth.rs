//! Credentials for git child processes.

use std::path::PathBuf;

use secrecy::ExposeSecret;

use crate::config::{GitAuthSettings, GitAuthType};
use crate::gitops::error::{GitOpsError, Result};
use crate::secrets::{expand_home, SecretSource};

/// Escapes a token for use inside a single-quoted shell string.
pub fn shell_escape_token(token: &str) -> String {
    token.replace('\'', "'\\''")
}

/// Deletes the askpass script when dropped so tokens never outlive the
/// command that needed them.
#[derive(Debug, Default)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Environment for one git invocation. Must outlive the child process.
#[derive(Debug, Default)]
pub struct AuthEnv {
    pub env_vars: Vec<(String, String)>,
    _cleanup: AskpassCleanup,
}

impl AuthEnv {
    /// An environment that adds nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env_vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Builds the environment for the configured authentication type.
pub fn build_auth_env(auth: &GitAuthSettings) -> Result<AuthEnv> {
    match auth.auth_type {
        GitAuthType::None => Ok(AuthEnv::none()),
        GitAuthType::Token => token_env(auth),
        GitAuthType::SshKey => ssh_env(auth),
    }
}

fn token_env(auth: &GitAuthSettings) -> Result<AuthEnv> {
    let token = SecretSource {
        direct: auth.token_insecure.as_deref(),
        file: auth.token_file.as_deref(),
        env_var: Some(auth.token_env_var.as_str()),
    }
    .resolve()
    .map_err(|e| {
        GitOpsError::GitAuthFailed(format!(
            "Failed to resolve git token: {}. Configure token, tokenFile, or tokenEnvVar.",
            e
        ))
    })?;

    let askpass_path = std::env::temp_dir().join(format!(
        ".wego-askpass-{}.sh",
        uuid::Uuid::new_v4()
    ));
    let script = format!(
        "#!/bin/sh\necho '{}'\n",
        shell_escape_token(token.expose_secret())
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o700)
            .open(&askpass_path)?;
        std::io::Write::write_all(&mut file, script.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(&askpass_path, &script)?;
    }

    let cleanup = AskpassCleanup::new(askpass_path.clone());
    let askpass = askpass_path
        .to_str()
        .ok_or_else(|| {
            GitOpsError::GitAuthFailed("Temp directory path contains non-UTF8 characters".to_string())
        })?
        .to_string();

    Ok(AuthEnv {
        env_vars: vec![
            ("GIT_ASKPASS".to_string(), askpass),
            ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
        ],
        _cleanup: cleanup,
    })
}

fn ssh_env(auth: &GitAuthSettings) -> Result<AuthEnv> {
    let key_path = if auth.ssh_key_path.is_empty() {
        dirs::home_dir()
            .map(|h| h.join(".ssh").join("id_ed25519"))
            .unwrap_or_else(|| PathBuf::from(".ssh/id_ed25519"))
    } else {
        PathBuf::from(expand_home(&auth.ssh_key_path))
    };

    if !key_path.exists() {
        return Err(GitOpsError::GitAuthFailed(format!(
            "SSH key file not found: {}",
            key_path.display()
        )));
    }

    let quoted = {
        let escaped = key_path.display().to_string().replace('\'', "'\\''");
        if escaped.starts_with('-') {
            format!("'./{}'", escaped)
        } else {
            format!("'{}'", escaped)
        }
    };

    Ok(AuthEnv {
        env_vars: vec![(
            "GIT_SSH_COMMAND".to_string(),
            format!("ssh -i {} -o StrictHostKeyChecking=accept-new", quoted),
        )],
        _cleanup: AskpassCleanup::default(),
    })
}
