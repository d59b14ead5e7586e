//! NPM Plugin - npm publish conventions for the npm registry
//!
//! npm reads its auth token from an `.npmrc` next to `package.json`, so this
//! is the one built-in registry whose credential is written to disk for the
//! duration of a publish.

use crate::core::model::{CommandTemplate, CredentialDelivery};
use crate::core::traits::{ManifestInfo, RegistryPlugin};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

const MARKERS: &[&str] = &[
    "cannot publish over the previously published versions",
    "cannot publish over previously published version",
];

lazy_static! {
    static ref VALID_NAME: Regex = Regex::new(r"^[a-z0-9._-]+$").unwrap();
}

/// Package.json structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<HashMap<String, String>>,
    #[serde(
        rename = "peerDependencies",
        skip_serializing_if = "Option::is_none"
    )]
    pub peer_dependencies: Option<HashMap<String, String>>,
}

/// NPM registry plugin
pub struct NpmPlugin {
    _private: (),
}

impl Default for NpmPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl NpmPlugin {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Validate package name according to npm rules
    /// https://docs.npmjs.com/cli/v9/configuring-npm/package-json#name
    fn validate_package_name(name: &str) -> Result<(), String> {
        if name.len() > 214 {
            return Err("package name must be at most 214 characters".to_string());
        }

        let (scope, bare) = match name.strip_prefix('@') {
            Some(scoped) => match scoped.split_once('/') {
                Some((scope, bare)) => (Some(scope), bare),
                None => return Err(format!("scoped name {} has no package part", name)),
            },
            None => (None, name),
        };

        if bare.starts_with('.') || bare.starts_with('_') {
            return Err("package name cannot start with a dot or underscore".to_string());
        }

        let all_valid = scope
            .into_iter()
            .chain(std::iter::once(bare))
            .all(|part| VALID_NAME.is_match(part));
        if !all_valid {
            return Err(format!(
                "package name {} may only contain lowercase letters, digits, '-', '_' and '.'",
                name
            ));
        }

        Ok(())
    }

    fn parse_manifest(content: &str) -> anyhow::Result<ManifestInfo> {
        let pkg: PackageJson = serde_json::from_str(content)?;

        if let Some(ref name) = pkg.name {
            Self::validate_package_name(name).map_err(|e| anyhow::anyhow!(e))?;
        }

        if let Some(ref version) = pkg.version {
            semver::Version::parse(version)
                .map_err(|e| anyhow::anyhow!("invalid version {}: {}", version, e))?;
        }

        let mut dependencies: Vec<String> = pkg
            .dependencies
            .iter()
            .chain(pkg.peer_dependencies.iter())
            .flat_map(|deps| deps.keys().cloned())
            .collect();
        dependencies.sort();
        dependencies.dedup();

        Ok(ManifestInfo {
            name: pkg.name,
            version: pkg.version,
            dependencies,
        })
    }
}

#[async_trait]
impl RegistryPlugin for NpmPlugin {
    fn name(&self) -> &str {
        "npm"
    }

    fn manifest_file(&self) -> Option<&str> {
        Some("package.json")
    }

    fn default_token_env(&self) -> Option<&str> {
        Some("NPM_TOKEN")
    }

    fn default_credential(&self) -> Option<CredentialDelivery> {
        Some(CredentialDelivery::File {
            file: ".npmrc".to_string(),
            template: "//registry.npmjs.org/:_authToken={token}\n".to_string(),
        })
    }

    fn default_command(&self) -> Option<CommandTemplate> {
        Some(CommandTemplate::new("npm", &["publish", "--access", "public"]))
    }

    fn already_published_markers(&self) -> &[&str] {
        MARKERS
    }

    async fn read_manifest(&self, package_path: &Path) -> anyhow::Result<ManifestInfo> {
        let content = fs::read_to_string(package_path.join("package.json")).await?;
        Self::parse_manifest(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::AlreadyPublishedMarkers;
    use crate::core::retry::{RetryPolicy, classify};
    use crate::core::traits::{CommandOutput, Outcome};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_detect() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("package.json"), r#"{"name":"app"}"#).unwrap();

        let plugin = NpmPlugin::new();
        assert!(plugin.detect(temp_dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_manifest() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("package.json"),
            r#"{
                "name": "@app/node",
                "version": "0.1.5",
                "dependencies": { "@app/types": "^0.1.0" },
                "peerDependencies": { "react": ">=18" },
                "devDependencies": { "jest": "^29.0.0" }
            }"#,
        )
        .unwrap();

        let info = NpmPlugin::new().read_manifest(temp_dir.path()).await.unwrap();

        assert_eq!(info.name.as_deref(), Some("@app/node"));
        assert_eq!(info.version.as_deref(), Some("0.1.5"));
        assert_eq!(info.dependencies, vec!["@app/types", "react"]);
    }

    #[test]
    fn test_validate_package_name() {
        assert!(NpmPlugin::validate_package_name("app-node").is_ok());
        assert!(NpmPlugin::validate_package_name("@scope/app.node").is_ok());
        assert!(NpmPlugin::validate_package_name("App").is_err());
        assert!(NpmPlugin::validate_package_name("_private").is_err());
        assert!(NpmPlugin::validate_package_name("@scope").is_err());
        assert!(NpmPlugin::validate_package_name(&"a".repeat(215)).is_err());
    }

    #[test]
    fn test_parse_manifest_rejects_invalid_version() {
        let err = NpmPlugin::parse_manifest(r#"{"name":"app","version":"latest"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid version"));
    }

    fn classify_npm(exit_code: i32, text: &str) -> Outcome {
        let markers =
            AlreadyPublishedMarkers::new(NpmPlugin::new().already_published_markers().iter().copied())
                .unwrap();
        let output = CommandOutput {
            exit_code: Some(exit_code),
            output: text.to_string(),
        };
        classify(&output, 1, &RetryPolicy::default(), &markers)
    }

    #[test]
    fn test_registry_rejection_is_already_published() {
        assert_eq!(
            classify_npm(
                1,
                "npm ERR! 403 Forbidden - PUT https://registry.npmjs.org/app-node - \
                 You cannot publish over the previously published versions: 0.1.5."
            ),
            Outcome::AlreadyPublished
        );
    }

    #[test]
    fn test_cache_eexist_is_transient() {
        assert_eq!(
            classify_npm(
                1,
                "npm ERR! code EEXIST\nnpm ERR! EEXIST: file already exists, mkdir '/home/u/.npm/_cacache'"
            ),
            Outcome::TransientFailure
        );
    }

    #[test]
    fn test_default_credential_is_npmrc() {
        let plugin = NpmPlugin::new();

        match plugin.default_credential().unwrap() {
            CredentialDelivery::File { file, template } => {
                assert_eq!(file, ".npmrc");
                assert!(template.contains("_authToken={token}"));
            }
            other => panic!("unexpected delivery: {:?}", other),
        }
    }
}
