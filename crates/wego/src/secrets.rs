//! Secret resolution for git credentials.
//!
//! A token can be given inline (local testing), as a file (mounted secrets),
//! or as the name of an environment variable. The first non-empty source wins,
//! in that order.

use secrecy::SecretString;
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{path}' is empty")]
    EmptyFile { path: String },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// The places a single secret may be read from. Empty strings count as unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretSource<'a> {
    pub direct: Option<&'a str>,
    pub file: Option<&'a str>,
    pub env_var: Option<&'a str>,
}

impl<'a> SecretSource<'a> {
    /// Returns true if at least one source is set.
    pub fn is_configured(&self) -> bool {
        [self.direct, self.file, self.env_var]
            .iter()
            .any(|s| s.is_some_and(|v| !v.is_empty()))
    }

    /// Resolves the secret from the first configured source.
    pub fn resolve(&self) -> Result<SecretString> {
        if let Some(value) = non_empty(self.direct) {
            return Ok(SecretString::from(value.to_string()));
        }

        if let Some(path) = non_empty(self.file) {
            let expanded = expand_home(path);
            let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
                path: expanded.clone(),
                source: e,
            })?;
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(SecretError::EmptyFile { path: expanded });
            }
            return Ok(SecretString::from(trimmed.to_string()));
        }

        if let Some(name) = non_empty(self.env_var) {
            return match std::env::var(name) {
                Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            };
        }

        Err(SecretError::NoSourceProvided)
    }
}

/// Resolves a secret from a direct value, a file, or an environment variable.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    SecretSource {
        direct,
        file: file_path,
        env_var,
    }
    .resolve()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Expands a leading `~` to the home directory. `~user` is not supported.
pub(crate) fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return home.join(&path[2..]).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_direct_value_wins() {
        std::env::set_var("WEGO_TEST_TOKEN_1", "from-env");
        let token = resolve_secret(Some("inline"), None, Some("WEGO_TEST_TOKEN_1")).unwrap();
        assert_eq!(token.expose_secret(), "inline");
        std::env::remove_var("WEGO_TEST_TOKEN_1");
    }

    #[test]
    #[serial]
    fn test_file_before_env() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  from-file  ").unwrap();
        std::env::set_var("WEGO_TEST_TOKEN_2", "from-env");

        let token = resolve_secret(
            Some(""),
            Some(file.path().to_str().unwrap()),
            Some("WEGO_TEST_TOKEN_2"),
        )
        .unwrap();
        assert_eq!(token.expose_secret(), "from-file");
        std::env::remove_var("WEGO_TEST_TOKEN_2");
    }

    #[test]
    #[serial]
    fn test_env_fallback() {
        std::env::set_var("WEGO_TEST_TOKEN_3", "from-env\n");
        let token = resolve_secret(None, None, Some("WEGO_TEST_TOKEN_3")).unwrap();
        assert_eq!(token.expose_secret(), "from-env");
        std::env::remove_var("WEGO_TEST_TOKEN_3");
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = NamedTempFile::new().unwrap();
        let err = resolve_secret(None, Some(file.path().to_str().unwrap()), None).unwrap_err();
        assert!(matches!(err, SecretError::EmptyFile { .. }));
    }

    #[test]
    fn test_missing_sources() {
        assert!(matches!(
            resolve_secret(None, None, None),
            Err(SecretError::NoSourceProvided)
        ));
        assert!(matches!(
            resolve_secret(None, Some("/nonexistent/wego/token"), None),
            Err(SecretError::FileReadError { .. })
        ));
        assert!(matches!(
            resolve_secret(None, None, Some("WEGO_DEFINITELY_UNSET_TOKEN")),
            Err(SecretError::EnvVarNotSet { .. })
        ));
    }

    #[test]
    fn test_is_configured() {
        assert!(!SecretSource::default().is_configured());
        assert!(!SecretSource {
            direct: Some(""),
            file: Some(""),
            env_var: None
        }
        .is_configured());
        assert!(SecretSource {
            env_var: Some("GITHUB_TOKEN"),
            ..Default::default()
        }
        .is_configured());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/etc/wego/token"), "/etc/wego/token");
        assert_eq!(expand_home("relative/token"), "relative/token");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~"), home.to_string_lossy());
            assert_eq!(
                expand_home("~/token"),
                home.join("token").to_string_lossy()
            );
        }
    }
}
