pub mod crates_io_plugin;
pub mod custom_plugin;
pub mod npm_plugin;
pub mod plugin_loader;
pub mod pypi_plugin;

pub use crates_io_plugin::CratesIoPlugin;
pub use custom_plugin::CustomPlugin;
pub use npm_plugin::NpmPlugin;
pub use plugin_loader::PluginLoader;
pub use pypi_plugin::PyPiPlugin;
