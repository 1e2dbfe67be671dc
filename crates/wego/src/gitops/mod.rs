//! GitOps repository state for the wego engine.
//!
//! This module provides:
//! - The on-disk application layout and its codec
//! - Flux source and kustomization objects
//! - A branch-keyed cache of cloned working copies and a batch git writer
//! - Artifact download and decoding
//! - Cluster automation bundles

pub mod application;
pub mod automation;
pub mod error;
pub mod fetcher;
pub mod git;
pub mod layout;
pub mod reader;
pub mod resource;
pub mod store;

pub use application::{Application, ChangeSet, File};
pub use error::{ErrorKind, GitOpsError, Result};
pub use fetcher::{ArtifactDescriptor, ArtifactFetcher, DecodedFile};
pub use git::{CommitIdentity, CommitOutcome, GitWriter, RepositoryCache, RepositoryHandle};
pub use layout::Layout;
pub use reader::{read_applications, walk_paths, ApplicationReader, DirSource, FileSource, MemorySource};
pub use resource::{
    Bucket, Component, ComponentKind, HelmRepository, Kustomization, ObjectKey, ObjectMeta,
};
pub use store::{AppStore, CreateInput, Mutation};
