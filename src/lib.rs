pub mod core;
pub mod orchestration;
pub mod plugins;
pub mod security;
pub mod validation;

pub use crate::core::*;
pub use orchestration::{PipelinePlan, ReleaseRunner, RunReport};
pub use plugins::PluginLoader;
pub use security::{CommandError, CredentialScope, SafeCommandExecutor, SecureTokenManager};
