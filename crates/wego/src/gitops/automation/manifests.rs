//! Static manifests shipped with the crate and the small generated ones.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::naming::validate_namespace;
use crate::gitops::application::File;
use crate::gitops::error::{GitOpsError, Result};
use crate::gitops::resource::ObjectMeta;

/// Custom resource definition of the `Application` kind.
pub const APP_CRD: &[u8] = include_bytes!("../../../templates/app-crd.yaml");

const WEGO_APP_TEMPLATE: &str = include_str!("../../../templates/wego-app.yaml.tpl");

/// Name of the config map holding the engine's namespace settings.
pub const WEGO_CONFIG_MAP_NAME: &str = "weave-gitops-config";

const APP_MANIFEST_DIR: &str = "gitops/app";
const RUNTIME_MANIFEST_DIR: &str = "gitops/runtime";

static RE_IMAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").unwrap());

/// Values substituted into the wego-app template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParams<'a> {
    pub namespace: &'a str,
    pub app_version: &'a str,
    /// Prepend a `Namespace` document.
    pub create_namespace: bool,
}

/// Renders the wego-app manifests. Values are substituted verbatim, so
/// both must be checked before they reach the template.
pub fn render_wego_app(params: &TemplateParams<'_>) -> Result<Vec<u8>> {
    validate_namespace(params.namespace)?;
    if !RE_IMAGE_TAG.is_match(params.app_version) {
        return Err(GitOpsError::InvalidSettings(format!(
            "app version '{}' is not a valid image tag",
            params.app_version.escape_debug()
        )));
    }

    let body = WEGO_APP_TEMPLATE
        .replace("{{ .Namespace }}", params.namespace)
        .replace("{{ .AppVersion }}", params.app_version);

    Ok(if params.create_namespace {
        format!(
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n---\n{}",
            params.namespace, body
        )
        .into_bytes()
    } else {
        body.into_bytes()
    })
}

/// Contents of `data.config` in the config map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WegoConfig {
    pub flux_namespace: String,
    pub wego_namespace: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigMap {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta,
    data: BTreeMap<String, String>,
}

/// Serializes the `weave-gitops-config` config map.
pub fn wego_config_map(config: &WegoConfig) -> Result<Vec<u8>> {
    let marshal = |e: serde_yaml::Error| GitOpsError::Marshal {
        app: WEGO_CONFIG_MAP_NAME.to_string(),
        path: "wego-config.yaml".to_string(),
        message: e.to_string(),
    };

    let mut data = BTreeMap::new();
    data.insert("config".to_string(), serde_yaml::to_string(config).map_err(marshal)?);

    let config_map = ConfigMap {
        api_version: "v1",
        kind: "ConfigMap",
        metadata: ObjectMeta::new(WEGO_CONFIG_MAP_NAME, config.wego_namespace.clone()),
        data,
    };
    Ok(serde_yaml::to_string(&config_map).map_err(marshal)?.into_bytes())
}

/// App and runtime manifests installed below `path_prefix` by the toolkit
/// installer.
pub fn gitops_manifests(path_prefix: &str, namespace: &str, app_version: &str) -> Result<Vec<File>> {
    let wego_app = render_wego_app(&TemplateParams {
        namespace,
        app_version,
        create_namespace: false,
    })?;

    Ok(vec![
        File::new(format!("{}/{}/wego-app.yaml", path_prefix, APP_MANIFEST_DIR), wego_app),
        File::new(
            format!("{}/{}/wego.weave.works_apps.yaml", path_prefix, RUNTIME_MANIFEST_DIR),
            APP_CRD,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_wego_app() {
        let rendered = render_wego_app(&TemplateParams {
            namespace: "wego-system",
            app_version: "v0.6.0",
            create_namespace: false,
        })
        .unwrap();
        let text = String::from_utf8(rendered).unwrap();
        assert!(text.contains("namespace: wego-system"));
        assert!(text.contains("wego-app:v0.6.0"));
        assert!(!text.contains("{{"));
        assert!(!text.contains("kind: Namespace"));

        let with_ns = render_wego_app(&TemplateParams {
            namespace: "wego-system",
            app_version: "v0.6.0",
            create_namespace: true,
        })
        .unwrap();
        let text = String::from_utf8(with_ns).unwrap();
        assert!(text.starts_with("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: wego-system\n---\n"));
    }

    #[test]
    fn test_render_rejects_unsafe_values() {
        for namespace in ["Wego_System", "wego\nkind: Secret", ""] {
            let err = render_wego_app(&TemplateParams {
                namespace,
                app_version: "v0.6.0",
                create_namespace: true,
            })
            .unwrap_err();
            assert!(matches!(err, GitOpsError::InvalidSettings(_)), "{namespace:?}");
        }

        let err = gitops_manifests("clusters/dev/system", "wego-system", "v0.6.0\n---").unwrap_err();
        assert!(matches!(err, GitOpsError::InvalidSettings(_)));
    }

    #[test]
    fn test_wego_config_map() {
        let data = wego_config_map(&WegoConfig {
            flux_namespace: "flux-system".to_string(),
            wego_namespace: "wego-system".to_string(),
        })
        .unwrap();

        let doc: serde_yaml::Value = serde_yaml::from_slice(&data).unwrap();
        assert_eq!(doc["kind"], "ConfigMap");
        assert_eq!(doc["metadata"]["name"], WEGO_CONFIG_MAP_NAME);
        assert_eq!(doc["metadata"]["namespace"], "wego-system");

        let config: WegoConfig =
            serde_yaml::from_str(doc["data"]["config"].as_str().unwrap()).unwrap();
        assert_eq!(config.flux_namespace, "flux-system");
    }

    #[test]
    fn test_crd_is_valid_yaml() {
        let doc: serde_yaml::Value = serde_yaml::from_slice(APP_CRD).unwrap();
        assert_eq!(doc["metadata"]["name"], "apps.wego.weave.works");
    }
}
