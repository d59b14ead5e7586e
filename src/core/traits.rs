//! Core traits and types for release orchestration
//!
//! This module defines the seams between the orchestrator and the outside
//! world (external commands, wall-clock delays, registry plugins) and the
//! result types that flow back through them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::model::{CommandInvocation, CommandTemplate, CredentialDelivery};
use crate::security::command_executor::CommandError;

// ============================================================================
// Outcomes
// ============================================================================

/// Classified result of one publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    /// The registry already has this version; treated as success
    AlreadyPublished,
    /// Non-zero exit with attempts remaining
    TransientFailure,
    /// Non-zero exit on the final attempt
    FatalFailure,
}

/// One execution of the publish command for one publishable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishAttempt {
    /// Attempt index, starting at 1
    pub index: u32,
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, tokens masked
    pub output: String,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
}

// ============================================================================
// External commands
// ============================================================================

/// Exit status and combined output text of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one external command to completion
///
/// This is the only place the orchestrator touches processes; everything
/// above it works on `CommandOutput`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, CommandError>;

    /// Whether `run` would accept this program
    fn allows(&self, _program: &str) -> bool {
        true
    }
}

// ============================================================================
// Delays
// ============================================================================

/// Why the orchestrator is waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayReason {
    /// Between a transient failure and the next attempt
    Backoff,
    /// After a successful publish, before dependents
    Propagation,
}

/// Suspends the run for a fixed duration
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration, reason: DelayReason);
}

/// Wall-clock delay backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration, _reason: DelayReason) {
        tokio::time::sleep(duration).await;
    }
}

// ============================================================================
// Registry Plugin Trait
// ============================================================================

/// Package metadata read from a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Names of runtime dependencies
    pub dependencies: Vec<String>,
}

/// Registry-specific knowledge for one registry kind
///
/// A plugin supplies the defaults a target of its kind starts from
/// (credential convention, publish command, idempotency markers) and knows
/// how to read its package manifests for pre-flight checks.
#[async_trait]
pub trait RegistryPlugin: Send + Sync {
    /// Plugin name (e.g., "npm", "crates-io")
    fn name(&self) -> &str;

    /// Manifest file expected in every package directory
    fn manifest_file(&self) -> Option<&str>;

    /// Environment variable holding the registry token
    fn default_token_env(&self) -> Option<&str>;

    /// How the token reaches the publish tool
    fn default_credential(&self) -> Option<CredentialDelivery>;

    /// Publish command run in each package directory
    fn default_command(&self) -> Option<CommandTemplate>;

    /// Output fragments reporting that the version is already published
    fn already_published_markers(&self) -> &[&str];

    /// Whether packages of this registry usually depend on each other
    fn ordered_by_default(&self) -> bool {
        false
    }

    /// Check that the package directory holds a manifest of this registry
    async fn detect(&self, package_path: &Path) -> anyhow::Result<bool> {
        match self.manifest_file() {
            Some(file) => Ok(tokio::fs::metadata(package_path.join(file)).await.is_ok()),
            None => Ok(tokio::fs::metadata(package_path).await.is_ok()),
        }
    }

    /// Read name, version and dependencies from the package manifest
    async fn read_manifest(&self, package_path: &Path) -> anyhow::Result<ManifestInfo>;
}
