//! Deterministic, length-constrained resource names.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use super::repo_url::RepoUrl;
use crate::gitops::error::{GitOpsError, Result};

static RE_DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// Longest name a cluster resource may carry.
pub const MAX_NAME_LENGTH: usize = 63;

/// Hex characters of the digest kept when a name is too long.
const HASH_LENGTH: usize = 32;

/// Lowercases `raw`, turns `_` and `.` into `-` and drops anything else
/// outside `[a-z0-9-]`.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            '_' | '.' => Some('-'),
            'a'..='z' | '0'..='9' | '-' => Some(c),
            _ => None,
        })
        .collect()
}

/// Accepts `namespace` only if it is a DNS label of at most 63 characters.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.len() > MAX_NAME_LENGTH || !RE_DNS_LABEL.is_match(namespace) {
        return Err(GitOpsError::InvalidSettings(format!(
            "namespace '{}' is not a valid DNS label",
            namespace.escape_debug()
        )));
    }
    Ok(())
}

/// Returns `name` unchanged when it fits, otherwise `wego-` followed by the
/// first 32 hex characters of its SHA-256 digest.
pub fn constrain_resource_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LENGTH {
        return name.to_string();
    }

    let digest = format!("{:x}", Sha256::digest(name.as_bytes()));
    format!("wego-{}", &digest[..HASH_LENGTH])
}

/// Name of the source object that tracks the config repository.
pub fn cluster_source_name(url: &RepoUrl) -> String {
    let qualified = format!(
        "wego-auto-{}-{}",
        url.provider(),
        normalize_name(url.repository_name())
    );
    constrain_resource_name(&qualified)
}

/// Name of the secret holding deploy credentials for a private repository.
pub fn repo_secret_name(url: &RepoUrl) -> String {
    let qualified = format!(
        "wego-{}-{}",
        url.provider(),
        normalize_name(url.repository_name())
    );
    constrain_resource_name(&qualified)
}
