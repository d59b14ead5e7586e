//! Pipeline file structures
//!
//! This module provides the serde representation of `.release-pipeline.yaml`.
//! Values here are raw; [`crate::core::config_loader`] validates them and
//! resolves plugin defaults into a [`crate::core::model::ReleaseConfig`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::model::RegistryKind;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PipelineFile {
    /// Schema version (required)
    pub version: String,

    /// Retry settings (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Extra programs allowed as publish commands
    #[serde(
        default,
        rename = "allowedCommands",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allowed_commands: Vec<String>,

    /// Targets in pipeline order (required)
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Retry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RetryConfig {
    #[serde(skip_serializing_if = "Option::is_none", rename = "maxAttempts")]
    pub max_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none", rename = "backoffSecs")]
    pub backoff_secs: Option<u64>,

    #[serde(
        skip_serializing_if = "Option::is_none",
        rename = "propagationDelaySecs"
    )]
    pub propagation_delay_secs: Option<u64>,
}

/// One registry target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// Target identifier (unique)
    pub name: String,

    /// Registry kind
    pub registry: RegistryKind,

    /// Enable this target (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Packages in dependency order
    #[serde(default)]
    pub packages: Vec<PackageConfig>,

    /// Environment variable holding the token
    #[serde(skip_serializing_if = "Option::is_none", rename = "tokenEnv")]
    pub token_env: Option<String>,

    /// Credential delivery override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialConfig>,

    /// Publish command override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandConfig>,

    /// "Already published" output markers override
    #[serde(
        skip_serializing_if = "Option::is_none",
        rename = "alreadyPublishedMarkers"
    )]
    pub already_published_markers: Option<Vec<String>>,

    /// Packages depend on earlier packages of this target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,

    /// Propagation delay override in seconds
    #[serde(
        skip_serializing_if = "Option::is_none",
        rename = "propagationDelaySecs"
    )]
    pub propagation_delay_secs: Option<u64>,
}

/// One package of a target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageConfig {
    /// Display name (default: last path component)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Package directory relative to the project root
    pub path: String,
}

/// Credential delivery; exactly one of `flag`, `env`, `file` must be set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CredentialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// File contents; `{token}` is replaced by the secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Publish command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}
