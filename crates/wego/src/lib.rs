pub mod config;
pub mod gitops;
pub mod sanitize;
pub mod secrets;

pub use config::{FetcherSettings, GitAuthSettings, GitAuthType, GitSettings, Settings};
pub use gitops::{
    AppStore, Application, ArtifactFetcher, ChangeSet, CommitOutcome, ErrorKind, GitOpsError,
    GitWriter, RepositoryCache, RepositoryHandle, Result,
};
pub use secrets::{resolve_secret, SecretError, SecretSource};
