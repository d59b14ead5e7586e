//! Crates.io Plugin - cargo publish conventions for crates.io

use crate::core::model::{CommandTemplate, CredentialDelivery};
use crate::core::traits::{ManifestInfo, RegistryPlugin};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;

const MARKERS: &[&str] = &["already exists", "is already uploaded"];

/// Crates.io registry plugin
pub struct CratesIoPlugin {
    _private: (),
}

impl Default for CratesIoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl CratesIoPlugin {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Parse a Cargo.toml
    ///
    /// Dependencies include `[dependencies]` and `[build-dependencies]`,
    /// both of which must exist on the registry before the crate is accepted.
    /// Renamed dependencies report the real package name.
    fn parse_manifest(content: &str) -> anyhow::Result<ManifestInfo> {
        let parsed: toml::Value = toml::from_str(content)?;
        let package = parsed.get("package");

        let name = package
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        // `version.workspace = true` leaves the version to the workspace root
        let version = package
            .and_then(|p| p.get("version"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        if let Some(ref version) = version {
            semver::Version::parse(version)
                .map_err(|e| anyhow::anyhow!("invalid version {}: {}", version, e))?;
        }

        let mut dependencies = Vec::new();
        for section in ["dependencies", "build-dependencies"] {
            if let Some(deps) = parsed.get(section).and_then(|v| v.as_table()) {
                for (key, value) in deps {
                    let real_name = value
                        .as_table()
                        .and_then(|t| t.get("package"))
                        .and_then(|v| v.as_str())
                        .unwrap_or(key);
                    dependencies.push(real_name.to_string());
                }
            }
        }
        dependencies.sort();
        dependencies.dedup();

        Ok(ManifestInfo {
            name,
            version,
            dependencies,
        })
    }
}

#[async_trait]
impl RegistryPlugin for CratesIoPlugin {
    fn name(&self) -> &str {
        "crates-io"
    }

    fn manifest_file(&self) -> Option<&str> {
        Some("Cargo.toml")
    }

    fn default_token_env(&self) -> Option<&str> {
        Some("CARGO_REGISTRY_TOKEN")
    }

    fn default_credential(&self) -> Option<CredentialDelivery> {
        Some(CredentialDelivery::Flag {
            flag: "--token".to_string(),
        })
    }

    fn default_command(&self) -> Option<CommandTemplate> {
        Some(CommandTemplate::new(
            "cargo",
            &["publish", "--allow-dirty", "--no-verify"],
        ))
    }

    fn already_published_markers(&self) -> &[&str] {
        MARKERS
    }

    fn ordered_by_default(&self) -> bool {
        true
    }

    async fn read_manifest(&self, package_path: &Path) -> anyhow::Result<ManifestInfo> {
        let content = fs::read_to_string(package_path.join("Cargo.toml")).await?;
        Self::parse_manifest(&content)
    }
}
