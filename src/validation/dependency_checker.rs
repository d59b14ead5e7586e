//! Dependency Checker - Pre-flight package and order checks
//!
//! Before anything is published, every package of an enabled target must
//! exist with its registry manifest, and no package may depend on a package
//! of the same target that is scheduled after it.
//!
//! # Example
//!
//! ```no_run
//! use publish_orchestrator::core::ReleaseTarget;
//! use publish_orchestrator::plugins::PluginLoader;
//! use publish_orchestrator::validation::DependencyChecker;
//!
//! # async fn example(target: &ReleaseTarget) -> Result<(), publish_orchestrator::core::PublishError> {
//! let loader = PluginLoader::new();
//! let plugin = loader.load_plugin(target.kind);
//! let manifests = DependencyChecker::new().check_target(target, plugin.as_ref()).await?;
//!
//! println!("{} packages checked", manifests.len());
//! # Ok(())
//! # }
//! ```

use crate::core::error::PublishError;
use crate::core::model::ReleaseTarget;
use crate::core::traits::{ManifestInfo, RegistryPlugin};
use std::collections::HashMap;

/// Checker for package manifests and dependency order
pub struct DependencyChecker;

impl Default for DependencyChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyChecker {
    pub fn new() -> Self {
        Self
    }

    /// Check every package of `target` and its dependency order
    ///
    /// Returns the manifests in package order.
    pub async fn check_target(
        &self,
        target: &ReleaseTarget,
        plugin: &dyn RegistryPlugin,
    ) -> Result<Vec<ManifestInfo>, PublishError> {
        let mut manifests = Vec::with_capacity(target.packages.len());

        for package in &target.packages {
            let invalid = |message: String| PublishError::InvalidPackage {
                target: target.name.clone(),
                package: package.name.clone(),
                message,
            };

            let present = plugin
                .detect(&package.path)
                .await
                .map_err(|e| invalid(e.to_string()))?;
            if !present {
                let message = match plugin.manifest_file() {
                    Some(file) => format!("{} not found in {}", file, package.relative_path),
                    None => format!("directory {} not found", package.relative_path),
                };
                return Err(invalid(message));
            }

            let manifest = plugin
                .read_manifest(&package.path)
                .await
                .map_err(|e| invalid(format!("unreadable manifest: {}", e)))?;
            tracing::debug!(
                target_name = %target.name,
                package = %package.name,
                version = manifest.version.as_deref().unwrap_or("-"),
                dependencies = manifest.dependencies.len(),
                "manifest checked"
            );
            manifests.push(manifest);
        }

        self.check_order(target, &manifests)?;
        Ok(manifests)
    }

    /// Check that no package depends on a later package of the same target
    ///
    /// Violations fail dependency-ordered targets and are only logged for
    /// unordered ones.
    pub fn check_order(
        &self,
        target: &ReleaseTarget,
        manifests: &[ManifestInfo],
    ) -> Result<(), PublishError> {
        let positions: HashMap<String, usize> = target
            .packages
            .iter()
            .zip(manifests)
            .map(|(package, manifest)| {
                let name = manifest.name.as_deref().unwrap_or(&package.name);
                (normalize(name), package.position)
            })
            .collect();

        for (package, manifest) in target.packages.iter().zip(manifests) {
            for dependency in &manifest.dependencies {
                let Some(&position) = positions.get(&normalize(dependency)) else {
                    continue;
                };
                if position <= package.position {
                    continue;
                }

                if target.ordered {
                    return Err(PublishError::DependencyOrder {
                        target: target.name.clone(),
                        package: package.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
                tracing::warn!(
                    target_name = %target.name,
                    package = %package.name,
                    dependency = %dependency,
                    "package depends on a later package of an unordered target"
                );
            }
        }

        Ok(())
    }
}

/// Registry names compare case-insensitively with `-` and `_` equivalent
fn normalize(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}
