//! Path rules of the GitOps repository layout.
//!
//! ```text
//! <baseDir>/apps/<app>/app.yaml
//! <baseDir>/apps/<app>/kustomization.yaml
//! <baseDir>/apps/<app>/<name>-<namespace>-<kind>.yaml
//! <baseDir>/clusters/<cluster>/system/...
//! <baseDir>/clusters/<cluster>/user/...
//! ```

use super::resource::{component_file_name, ComponentKind, ObjectKey};

/// Default directory all engine-managed files live under.
pub const BASE_DIR: &str = ".weave-gitops";

/// Application descriptor file name.
pub const APP_FILENAME: &str = "app.yaml";

/// Aggregating manifest file name.
pub const KUSTOMIZATION_FILENAME: &str = "kustomization.yaml";

const APPS_DIR: &str = "apps";
const CLUSTERS_DIR: &str = "clusters";
const SYSTEM_DIR: &str = "system";
const USER_DIR: &str = "user";

/// How a repository-relative path relates to the application layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppPath<'a> {
    /// Not under the applications prefix.
    Outside,
    /// The application descriptor.
    Descriptor { app: &'a str },
    /// The aggregating manifest.
    Manifest { app: &'a str },
    /// A component file of a known kind.
    Component { app: &'a str, kind: ComponentKind },
    /// Anything else inside an application folder.
    Other { app: &'a str },
}

/// Computes repository-relative paths for a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    base_dir: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(BASE_DIR)
    }
}

impl Layout {
    /// Creates a layout rooted at `base_dir`. Surrounding slashes are ignored.
    pub fn new(base_dir: impl Into<String>) -> Self {
        let base_dir = base_dir.into();
        Self {
            base_dir: base_dir.trim_matches('/').to_string(),
        }
    }

    /// Returns the base directory.
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// `<baseDir>/apps/`
    pub fn apps_prefix(&self) -> String {
        self.join(&[APPS_DIR, ""])
    }

    /// `<baseDir>/apps/<app>`
    pub fn app_root(&self, app: &str) -> String {
        self.join(&[APPS_DIR, app])
    }

    /// `<baseDir>/apps/<app>/<file>`
    pub fn app_file(&self, app: &str, file: &str) -> String {
        self.join(&[APPS_DIR, app, file])
    }

    /// `<baseDir>/apps/<app>/app.yaml`
    pub fn descriptor_path(&self, app: &str) -> String {
        self.app_file(app, APP_FILENAME)
    }

    /// `<baseDir>/apps/<app>/kustomization.yaml`
    pub fn manifest_path(&self, app: &str) -> String {
        self.app_file(app, KUSTOMIZATION_FILENAME)
    }

    /// `<baseDir>/apps/<app>/<name>-<namespace>-<kind>.yaml`
    pub fn component_path(&self, app: &str, key: &ObjectKey, kind: ComponentKind) -> String {
        self.app_file(app, &component_file_name(key, kind))
    }

    /// `<baseDir>/clusters/<cluster>/system`
    pub fn system_dir(&self, cluster: &str) -> String {
        self.join(&[CLUSTERS_DIR, cluster, SYSTEM_DIR])
    }

    /// `<baseDir>/clusters/<cluster>/user`
    pub fn user_dir(&self, cluster: &str) -> String {
        self.join(&[CLUSTERS_DIR, cluster, USER_DIR])
    }

    /// `<baseDir>/clusters/<cluster>/system/<file>`
    pub fn system_file(&self, cluster: &str, file: &str) -> String {
        format!("{}/{}", self.system_dir(cluster), file)
    }

    /// Classifies a repository-relative path.
    ///
    /// A path that starts with the applications prefix but has an empty
    /// application segment breaks the convention and is rejected.
    pub fn classify<'a>(&self, path: &'a str) -> Result<AppPath<'a>, String> {
        let prefix = self.apps_prefix();
        let Some(rest) = path.strip_prefix(prefix.as_str()) else {
            return Ok(AppPath::Outside);
        };

        let mut segments = rest.split('/');
        let app = segments.next().unwrap_or_default();
        if app.is_empty() {
            return Err(path.to_string());
        }

        let remaining: Vec<&str> = segments.collect();
        let [file] = remaining.as_slice() else {
            return Ok(AppPath::Other { app });
        };

        Ok(match *file {
            APP_FILENAME => AppPath::Descriptor { app },
            KUSTOMIZATION_FILENAME => AppPath::Manifest { app },
            name => match super::resource::kind_from_file_name(name) {
                Some(kind) => AppPath::Component { app, kind },
                None => AppPath::Other { app },
            },
        })
    }

    fn join(&self, parts: &[&str]) -> String {
        let mut path = self.base_dir.clone();
        for part in parts {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(part);
        }
        path
    }
}

/// Normalizes an OS path fragment to the `/`-separated form used in files.
pub fn to_slash(path: &std::path::Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_paths() {
        let layout = Layout::default();
        assert_eq!(layout.apps_prefix(), ".weave-gitops/apps/");
        assert_eq!(layout.descriptor_path("podinfo"), ".weave-gitops/apps/podinfo/app.yaml");
        assert_eq!(
            layout.manifest_path("podinfo"),
            ".weave-gitops/apps/podinfo/kustomization.yaml"
        );
        assert_eq!(
            layout.component_path(
                "podinfo",
                &ObjectKey::new("src", "default"),
                ComponentKind::GitRepository
            ),
            ".weave-gitops/apps/podinfo/src-default-gitrepository.yaml"
        );
    }

    #[test]
    fn test_cluster_paths() {
        let layout = Layout::default();
        assert_eq!(layout.system_dir("kind-a"), ".weave-gitops/clusters/kind-a/system");
        assert_eq!(layout.user_dir("kind-a"), ".weave-gitops/clusters/kind-a/user");
        assert_eq!(
            layout.system_file("kind-a", "wego-app.yaml"),
            ".weave-gitops/clusters/kind-a/system/wego-app.yaml"
        );
    }

    #[test]
    fn test_custom_base_dir_is_trimmed() {
        let layout = Layout::new("/gitops/");
        assert_eq!(layout.base_dir(), "gitops");
        assert_eq!(layout.descriptor_path("a"), "gitops/apps/a/app.yaml");
    }

    #[test]
    fn test_classify() {
        let layout = Layout::default();
        assert_eq!(layout.classify("README.md"), Ok(AppPath::Outside));
        assert_eq!(
            layout.classify(".weave-gitops/clusters/a/system/wego-app.yaml"),
            Ok(AppPath::Outside)
        );
        assert_eq!(
            layout.classify(".weave-gitops/apps/podinfo/app.yaml"),
            Ok(AppPath::Descriptor { app: "podinfo" })
        );
        assert_eq!(
            layout.classify(".weave-gitops/apps/podinfo/kustomization.yaml"),
            Ok(AppPath::Manifest { app: "podinfo" })
        );
        assert_eq!(
            layout.classify(".weave-gitops/apps/podinfo/src-default-bucket.yaml"),
            Ok(AppPath::Component {
                app: "podinfo",
                kind: ComponentKind::Bucket
            })
        );
        assert_eq!(
            layout.classify(".weave-gitops/apps/podinfo/overlays/kustomization.yaml"),
            Ok(AppPath::Other { app: "podinfo" })
        );
        assert_eq!(
            layout.classify(".weave-gitops/apps/podinfo"),
            Ok(AppPath::Other { app: "podinfo" })
        );
        assert!(layout.classify(".weave-gitops/apps//app.yaml").is_err());
        assert!(layout.classify(".weave-gitops/apps/").is_err());
    }
}
