//! Builders for component objects used across tests.

#![allow(dead_code)]

use wego::gitops::resource::{
    CrossNamespaceSourceReference, GitRepositoryRef, GitRepositorySpec, KustomizationSpec,
};
use wego::gitops::{Component, ObjectKey};

/// A `GitRepository` source tracking `branch`.
pub fn git_source(name: &str, namespace: &str, url: &str, branch: &str) -> Component {
    let spec = GitRepositorySpec {
        url: url.to_string(),
        interval: "30s".to_string(),
        reference: Some(GitRepositoryRef {
            branch: Some(branch.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    Component::GitSource(wego::gitops::resource::GitRepository::new(
        ObjectKey::new(name, namespace),
        spec,
    ))
}

/// A `Kustomization` reconciling `path` from the named git source.
pub fn kustomization(name: &str, namespace: &str, source: &str, path: &str) -> Component {
    let spec = KustomizationSpec {
        path: path.to_string(),
        interval: "1m0s".to_string(),
        prune: true,
        source_ref: CrossNamespaceSourceReference {
            kind: "GitRepository".to_string(),
            name: source.to_string(),
            namespace: None,
        },
        ..Default::default()
    };
    Component::FluxKustomization(wego::gitops::Kustomization::new(
        ObjectKey::new(name, namespace),
        spec,
    ))
}
