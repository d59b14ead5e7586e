//! Plugin Loader - Maps registry kinds to their plugins
//!
//! # Example
//!
//! ```
//! use publish_orchestrator::core::RegistryKind;
//! use publish_orchestrator::plugins::PluginLoader;
//!
//! let loader = PluginLoader::new();
//! let plugin = loader.load_plugin(RegistryKind::Npm);
//! assert_eq!(plugin.name(), "npm");
//! ```

use crate::core::model::RegistryKind;
use crate::core::traits::RegistryPlugin;
use crate::plugins::{CratesIoPlugin, CustomPlugin, NpmPlugin, PyPiPlugin};
use std::sync::Arc;

/// Plugin loader for registry plugins
pub struct PluginLoader {
    crates_io: Arc<dyn RegistryPlugin>,
    pypi: Arc<dyn RegistryPlugin>,
    npm: Arc<dyn RegistryPlugin>,
    custom: Arc<dyn RegistryPlugin>,
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLoader {
    /// Create a loader with the built-in plugins
    pub fn new() -> Self {
        Self {
            crates_io: Arc::new(CratesIoPlugin::new()),
            pypi: Arc::new(PyPiPlugin::new()),
            npm: Arc::new(NpmPlugin::new()),
            custom: Arc::new(CustomPlugin::new()),
        }
    }

    /// Get the plugin for a registry kind
    pub fn load_plugin(&self, kind: RegistryKind) -> Arc<dyn RegistryPlugin> {
        match kind {
            RegistryKind::CratesIo => Arc::clone(&self.crates_io),
            RegistryKind::Pypi => Arc::clone(&self.pypi),
            RegistryKind::Npm => Arc::clone(&self.npm),
            RegistryKind::Custom => Arc::clone(&self.custom),
        }
    }
}
