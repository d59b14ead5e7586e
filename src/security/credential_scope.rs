//! Ephemeral credential scope for one publish operation
//!
//! A scope applies a resolved token to a command invocation according to the
//! target's delivery convention. File-based credentials are written into the
//! package directory on acquisition and removed when the scope is dropped,
//! on every exit path.

use crate::core::error::PublishError;
use crate::core::model::{CommandInvocation, CredentialDelivery};
use secrecy::{ExposeSecret, SecretString};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Credential held for the duration of one publish operation
#[derive(Debug)]
pub enum CredentialScope {
    /// Token lives in the invocation's arguments or child environment
    InMemory,
    /// Token written to disk; removed on drop
    File(CredentialFile),
}

impl CredentialScope {
    /// Apply `token` to `invocation` and create any on-disk artifact
    pub fn acquire(
        target: &str,
        delivery: &CredentialDelivery,
        token: &SecretString,
        invocation: &mut CommandInvocation,
    ) -> Result<Self, PublishError> {
        match delivery {
            CredentialDelivery::Flag { flag } => {
                invocation.args.push(flag.clone());
                invocation.args.push(token.expose_secret().to_string());
                Ok(Self::InMemory)
            }
            CredentialDelivery::Env { name } => {
                invocation
                    .env
                    .push((name.clone(), token.expose_secret().to_string()));
                Ok(Self::InMemory)
            }
            CredentialDelivery::File { file, template } => {
                let path = invocation.working_dir.join(file);
                let contents = template.replace("{token}", token.expose_secret());
                let file = CredentialFile::create(&path, &contents).map_err(|e| {
                    PublishError::UnexpectedException {
                        target: target.to_string(),
                        message: format!("failed to write {}: {}", path.display(), e),
                    }
                })?;
                Ok(Self::File(file))
            }
        }
    }
}

/// Credential file owned by the orchestrator
#[derive(Debug)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    /// Create the file; an existing file is never overwritten
    fn create(path: &Path, contents: &str) -> std::io::Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut handle = options.open(path)?;
        let guard = Self {
            path: path.to_path_buf(),
        };
        handle.write_all(contents.as_bytes())?;
        handle.flush()?;

        tracing::debug!(path = %guard.path.display(), "credential file written");
        Ok(guard)
    }
}

impl Drop for CredentialFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "credential file removed"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove credential file"
            ),
        }
    }
}
