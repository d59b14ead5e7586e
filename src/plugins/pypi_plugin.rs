//! PyPI Plugin - maturin publish conventions for PyPI

use crate::core::model::{CommandTemplate, CredentialDelivery};
use crate::core::traits::{ManifestInfo, RegistryPlugin};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;

const MARKERS: &[&str] = &["file already exists"];

/// PyPI registry plugin
pub struct PyPiPlugin {
    _private: (),
}

impl Default for PyPiPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl PyPiPlugin {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Parse a pyproject.toml `[project]` table
    ///
    /// Python versions follow PEP 440, so the version is not checked here.
    fn parse_manifest(content: &str) -> anyhow::Result<ManifestInfo> {
        let parsed: toml::Value = toml::from_str(content)?;
        let project = parsed.get("project");

        let name = project
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let version = project
            .and_then(|p| p.get("version"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut dependencies: Vec<String> = project
            .and_then(|p| p.get("dependencies"))
            .and_then(|v| v.as_array())
            .map(|deps| {
                deps.iter()
                    .filter_map(|d| d.as_str())
                    .filter_map(requirement_name)
                    .collect()
            })
            .unwrap_or_default();
        dependencies.sort();
        dependencies.dedup();

        Ok(ManifestInfo {
            name,
            version,
            dependencies,
        })
    }
}

/// Distribution name of a PEP 508 requirement (`foo[extra]>=1; marker` → `foo`)
fn requirement_name(requirement: &str) -> Option<String> {
    let name: String = requirement
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if name.is_empty() { None } else { Some(name) }
}

#[async_trait]
impl RegistryPlugin for PyPiPlugin {
    fn name(&self) -> &str {
        "pypi"
    }

    fn manifest_file(&self) -> Option<&str> {
        Some("pyproject.toml")
    }

    fn default_token_env(&self) -> Option<&str> {
        Some("PYPI_API_TOKEN")
    }

    fn default_credential(&self) -> Option<CredentialDelivery> {
        Some(CredentialDelivery::Env {
            name: "MATURIN_PYPI_TOKEN".to_string(),
        })
    }

    fn default_command(&self) -> Option<CommandTemplate> {
        Some(
            CommandTemplate::new("maturin", &["publish", "--interpreter", "{interpreter}"])
                .with_env("PYO3_PYTHON", "{interpreter}"),
        )
    }

    fn already_published_markers(&self) -> &[&str] {
        MARKERS
    }

    async fn read_manifest(&self, package_path: &Path) -> anyhow::Result<ManifestInfo> {
        let content = fs::read_to_string(package_path.join("pyproject.toml")).await?;
        Self::parse_manifest(&content)
    }
}
