//! Downloads published source artifacts and decodes their YAML entries.
//!
//! An artifact is a gzip-compressed tar snapshot of a repository tree. The
//! body is streamed through the decompressor and the tar reader on a
//! blocking thread; the archive is never buffered whole.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::Instrument;

use super::application::Application;
use super::error::{GitOpsError, Result};
use super::layout::Layout;
use super::reader::ApplicationReader;
use crate::config::FetcherSettings;
use crate::sanitize::redact_artifact_url;

/// Suffixes of generated runtime files that are not part of a user's tree.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "/system/gitops-runtime.yaml",
    "/system/flux-system-kustomization-resource.yaml",
    "/system/flux-user-kustomization-resource.yaml",
    "/system/wego-app.yaml",
    "/system/wego-config.yaml",
    "/system/wego-system.yaml",
    ".keep",
];

/// Entry name used in errors that are not tied to one tar entry.
const ARCHIVE: &str = "<archive>";

/// Where to fetch an artifact from and which entries to leave out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub url: String,
    /// Entry name suffixes to skip. Matching is case-sensitive.
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl ArtifactDescriptor {
    /// A descriptor using [`DEFAULT_EXCLUSIONS`].
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_exclusions(mut self, exclusions: Vec<String>) -> Self {
        self.exclusions = exclusions;
        self
    }
}

/// One archive entry, decoded from YAML into a generic value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedFile {
    pub path: String,
    pub data: serde_json::Value,
}

/// HTTP client for source artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ArtifactFetcher {
    /// Creates a fetcher whose requests, body included, must finish within
    /// `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| GitOpsError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { client, timeout })
    }

    pub fn from_settings(settings: &FetcherSettings) -> Result<Self> {
        Self::new(settings.timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Downloads the artifact and decodes every included entry.
    pub async fn fetch(&self, descriptor: &ArtifactDescriptor) -> Result<Vec<DecodedFile>> {
        let url = redact_artifact_url(&descriptor.url);
        let span = tracing::info_span!("artifact_fetch", url = %url);

        self.download_and_decode(descriptor, url)
            .instrument(span)
            .await
    }

    async fn download_and_decode(
        &self,
        descriptor: &ArtifactDescriptor,
        url: String,
    ) -> Result<Vec<DecodedFile>> {
        let response = self
            .client
            .get(&descriptor.url)
            .send()
            .await
            .map_err(|source| GitOpsError::Http {
                url: url.clone(),
                source: source.without_url(),
            })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(GitOpsError::HttpStatus {
                url,
                status: response.status().to_string(),
            });
        }

        let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        let reader = SyncIoBridge::new(StreamReader::new(body));
        let exclusions = descriptor.exclusions.clone();

        let files = tokio::task::spawn_blocking(move || decode_archive(reader, &exclusions))
            .await
            .map_err(|e| GitOpsError::Artifact {
                entry: ARCHIVE.to_string(),
                message: e.to_string(),
            })??;

        tracing::info!(files = files.len(), "Fetched artifact");
        Ok(files)
    }
}

/// Decodes a gzip tar stream.
///
/// Non-regular entries (directories, links) and entries whose name ends
/// with one of `exclusions` are skipped. An empty YAML entry decodes to
/// `null`; a multi-document entry decodes to an array of its documents.
pub fn decode_archive<R: Read>(reader: R, exclusions: &[String]) -> Result<Vec<DecodedFile>> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let entries = archive
        .entries()
        .map_err(|e| artifact_error(ARCHIVE, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| artifact_error(ARCHIVE, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        if exclusions.iter().any(|suffix| path.ends_with(suffix.as_str())) {
            tracing::debug!(entry = %path, "Skipping excluded entry");
            continue;
        }

        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| artifact_error(&path, e))?;
        let data = decode_documents(&data).map_err(|message| GitOpsError::Artifact {
            entry: path.clone(),
            message,
        })?;

        files.push(DecodedFile { path, data });
    }
    Ok(files)
}

/// Folds fetched files into applications with the same rules the tree
/// reader applies to a working copy.
pub fn applications_from_artifact(
    files: &[DecodedFile],
    layout: &Layout,
) -> Result<BTreeMap<String, Application>> {
    let mut reader = ApplicationReader::new(layout.clone());
    for file in files {
        let path = file.path.trim_start_matches("./");
        let value = serde_yaml::to_value(&file.data).map_err(|e| GitOpsError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        reader.read_value(path, value)?;
    }
    reader.finish()
}

fn decode_documents(data: &[u8]) -> std::result::Result<serde_json::Value, String> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(data) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| e.to_string())?;
        documents.push(serde_json::to_value(value).map_err(|e| e.to_string())?);
    }

    Ok(match documents.len() {
        0 => serde_json::Value::Null,
        1 => documents.remove(0),
        _ => serde_json::Value::Array(documents),
    })
}

fn artifact_error(entry: &str, err: std::io::Error) -> GitOpsError {
    GitOpsError::Artifact {
        entry: entry.to_string(),
        message: err.to_string(),
    }
}
