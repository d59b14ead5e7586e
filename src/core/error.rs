//! Error handling for release runs
//!
//! This module provides the error taxonomy of a release run with recovery
//! guidance, using the thiserror crate for ergonomic error handling.

use thiserror::Error;

/// Main error type for release orchestration
#[derive(Error, Debug)]
pub enum PublishError {
    // Pre-flight errors
    #[error("[{target}] credential variable {variable} is not set")]
    MissingCredential { target: String, variable: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("[{target}] {package} depends on {dependency}, which is scheduled after it")]
    DependencyOrder {
        target: String,
        package: String,
        dependency: String,
    },

    #[error("[{target}] {package}: {message}")]
    InvalidPackage {
        target: String,
        package: String,
        message: String,
    },

    // Publish errors
    #[error("[{target}] {package}: attempt {attempt} failed (exit code {exit_code:?})")]
    TransientCommandFailure {
        target: String,
        package: String,
        attempt: u32,
        exit_code: Option<i32>,
    },

    #[error("[{target}] {package}: publish failed after {attempts} attempt(s) (exit code {exit_code:?})")]
    ExhaustedRetries {
        target: String,
        package: String,
        attempts: u32,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("[{target}] unexpected error: {message}")]
    UnexpectedException { target: String, message: String },
}

impl PublishError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Get the target name associated with this error, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::MissingCredential { target, .. }
            | Self::DependencyOrder { target, .. }
            | Self::InvalidPackage { target, .. }
            | Self::TransientCommandFailure { target, .. }
            | Self::ExhaustedRetries { target, .. }
            | Self::UnexpectedException { target, .. } => Some(target),
            Self::Config { .. } => None,
        }
    }

    /// Check if this error was raised before any publish command ran
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. }
                | Self::Config { .. }
                | Self::DependencyOrder { .. }
                | Self::InvalidPackage { .. }
        )
    }

    /// Captured command output attached to the error, if any
    pub fn diagnostic_output(&self) -> Option<&str> {
        match self {
            Self::ExhaustedRetries { output, .. } if !output.trim().is_empty() => Some(output),
            _ => None,
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::MissingCredential { .. } => vec![
                "Set the variable in the environment or in the .env file",
                "Disable the target with `enabled: false` if it should not run",
            ],
            Self::Config { .. } => vec![
                "Check .release-pipeline.yaml against the documented schema",
                "Run `publish-orchestrator init` to generate a starting point",
            ],
            Self::DependencyOrder { .. } => {
                vec!["Move the dependency above its dependents in the target's package list"]
            }
            Self::InvalidPackage { .. } => vec![
                "Check that the package path exists and contains its manifest",
                "Check the manifest's name and version fields",
            ],
            Self::TransientCommandFailure { .. } => vec!["No action needed, the attempt is retried"],
            Self::ExhaustedRetries { .. } => vec![
                "Inspect the captured output above",
                "Check registry status and network connectivity",
                "Re-run the pipeline; already published packages are skipped",
            ],
            Self::UnexpectedException { .. } => vec![
                "Check that the publish tool is installed and on PATH",
                "Check file permissions in the package directory",
            ],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential { .. } => "MISSING_CREDENTIAL",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::DependencyOrder { .. } => "DEPENDENCY_ORDER",
            Self::InvalidPackage { .. } => "INVALID_PACKAGE",
            Self::TransientCommandFailure { .. } => "TRANSIENT_COMMAND_FAILURE",
            Self::ExhaustedRetries { .. } => "EXHAUSTED_RETRIES",
            Self::UnexpectedException { .. } => "UNEXPECTED_EXCEPTION",
        }
    }
}
