pub mod command_executor;
pub mod credential_scope;
pub mod token_manager;

pub use command_executor::{CommandError, SafeCommandExecutor};
pub use credential_scope::{CredentialFile, CredentialScope};
pub use token_manager::{CredentialStatus, SecureTokenManager};
