//! Custom Plugin - targets described entirely by the pipeline file

use crate::core::model::{CommandTemplate, CredentialDelivery};
use crate::core::traits::{ManifestInfo, RegistryPlugin};
use async_trait::async_trait;
use std::path::Path;

/// Registry plugin without defaults
///
/// A custom target must configure its token variable, credential delivery
/// and command. Packages only need an existing directory.
pub struct CustomPlugin {
    _private: (),
}

impl Default for CustomPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomPlugin {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

#[async_trait]
impl RegistryPlugin for CustomPlugin {
    fn name(&self) -> &str {
        "custom"
    }

    fn manifest_file(&self) -> Option<&str> {
        None
    }

    fn default_token_env(&self) -> Option<&str> {
        None
    }

    fn default_credential(&self) -> Option<CredentialDelivery> {
        None
    }

    fn default_command(&self) -> Option<CommandTemplate> {
        None
    }

    fn already_published_markers(&self) -> &[&str] {
        &[]
    }

    async fn read_manifest(&self, _package_path: &Path) -> anyhow::Result<ManifestInfo> {
        Ok(ManifestInfo::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_detect_requires_directory_only() {
        let temp_dir = TempDir::new().unwrap();
        let plugin = CustomPlugin::new();

        assert!(plugin.detect(temp_dir.path()).await.unwrap());
        assert!(!plugin.detect(&temp_dir.path().join("missing")).await.unwrap());
    }

    #[test]
    fn test_has_no_defaults() {
        let plugin = CustomPlugin::new();

        assert!(plugin.default_token_env().is_none());
        assert!(plugin.default_credential().is_none());
        assert!(plugin.default_command().is_none());
        assert!(plugin.already_published_markers().is_empty());
    }
}
