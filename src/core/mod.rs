pub mod config;
pub mod config_loader;
pub mod env;
pub mod error;
pub mod model;
pub mod retry;
pub mod traits;

pub use config_loader::{CliOverrides, ConfigLoadOptions, ConfigLoader};
pub use env::EnvSnapshot;
pub use error::*;
pub use model::*;
pub use retry::*;
pub use traits::*;
