//! Release model: targets, publishables and command templates
//!
//! These types are the immutable, fully-resolved form of the pipeline
//! configuration. They are built once by the config loader and passed by
//! reference to every component of a run.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::retry::RetryPolicy;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([a-z_]+)\}").unwrap();
}

/// Placeholders a command template may reference
pub const TEMPLATE_PLACEHOLDERS: &[&str] = &["name", "path", "interpreter"];

/// Registry kind of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryKind {
    CratesIo,
    Pypi,
    Npm,
    Custom,
}

impl RegistryKind {
    /// Get string representation of registry kind
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryKind::CratesIo => "crates-io",
            RegistryKind::Pypi => "pypi",
            RegistryKind::Npm => "npm",
            RegistryKind::Custom => "custom",
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a resolved token reaches the publish tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialDelivery {
    /// Appended to the arguments as `<flag> <token>`
    Flag { flag: String },
    /// Set in the child process environment only
    Env { name: String },
    /// Written to `file` inside the package directory; `{token}` in the
    /// template is replaced by the secret
    File { file: String, template: String },
}

impl CredentialDelivery {
    /// Short description for plan output
    pub fn describe(&self) -> String {
        match self {
            Self::Flag { flag } => format!("flag {}", flag),
            Self::Env { name } => format!("env {}", name),
            Self::File { file, .. } => format!("file {}", file),
        }
    }
}

/// Values substituted into a command template for one publishable
#[derive(Debug, Clone)]
pub struct TemplateVars<'a> {
    pub name: &'a str,
    pub path: &'a str,
    pub interpreter: &'a str,
}

impl TemplateVars<'_> {
    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            "name" => Some(self.name),
            "path" => Some(self.path),
            "interpreter" => Some(self.interpreter),
            _ => None,
        }
    }
}

/// External publish command template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandTemplate {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    /// Names of placeholders that are not supported
    pub fn unknown_placeholders(&self) -> Vec<String> {
        let fields = std::iter::once(&self.program)
            .chain(self.args.iter())
            .chain(self.env.values());

        let mut unknown: Vec<String> = fields
            .flat_map(|field| PLACEHOLDER.captures_iter(field))
            .map(|cap| cap[1].to_string())
            .filter(|name| !TEMPLATE_PLACEHOLDERS.contains(&name.as_str()))
            .collect();
        unknown.sort();
        unknown.dedup();
        unknown
    }

    /// Expand placeholders into a concrete invocation
    pub fn expand(&self, vars: &TemplateVars<'_>, working_dir: PathBuf) -> CommandInvocation {
        let expand = |input: &str| -> String {
            PLACEHOLDER
                .replace_all(input, |cap: &regex::Captures<'_>| {
                    vars.lookup(&cap[1])
                        .map(str::to_string)
                        .unwrap_or_else(|| cap[0].to_string())
                })
                .into_owned()
        };

        CommandInvocation {
            program: expand(&self.program),
            args: self.args.iter().map(|a| expand(a)).collect(),
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), expand(v)))
                .collect(),
            working_dir,
        }
    }

    /// Render as a shell-like line for plan output
    pub fn render(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One concrete external command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: PathBuf,
}

impl CommandInvocation {
    /// Command line as text. May contain a token; mask before printing.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Case-insensitive "already published" markers of a target
#[derive(Debug, Clone)]
pub struct AlreadyPublishedMarkers {
    patterns: Vec<String>,
    matcher: AhoCorasick,
}

impl AlreadyPublishedMarkers {
    pub fn new<I, S>(patterns: I) -> Result<Self, aho_corasick::BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.trim().is_empty())
            .collect();
        let matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(&patterns)?;

        Ok(Self { patterns, matcher })
    }

    /// Check whether command output reports an existing version
    pub fn matches(&self, output: &str) -> bool {
        !self.patterns.is_empty() && self.matcher.is_match(output)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// One package to publish into a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publishable {
    pub name: String,
    /// Path relative to the project root, as configured
    pub relative_path: String,
    /// Absolute package directory, used as working directory
    pub path: PathBuf,
    pub target: String,
    /// Position in the target's dependency order, starting at 0
    pub position: usize,
}

/// One registry destination
#[derive(Debug, Clone)]
pub struct ReleaseTarget {
    pub name: String,
    pub kind: RegistryKind,
    pub enabled: bool,
    pub token_env: String,
    pub credential: CredentialDelivery,
    pub command: CommandTemplate,
    pub markers: AlreadyPublishedMarkers,
    /// Packages depend on earlier packages of the same target
    pub ordered: bool,
    pub propagation_delay: Duration,
    pub packages: Vec<Publishable>,
}

/// Fully resolved, immutable configuration of one release run
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    pub project_path: PathBuf,
    pub retry: RetryPolicy,
    /// Interpreter substituted for `{interpreter}`
    pub interpreter: String,
    /// Programs allowed in addition to the built-in publish tools
    pub allowed_commands: Vec<String>,
    /// Targets in pipeline order
    pub targets: Vec<ReleaseTarget>,
}

impl ReleaseConfig {
    /// Targets that take part in the run, in pipeline order
    pub fn enabled_targets(&self) -> impl Iterator<Item = &ReleaseTarget> {
        self.targets.iter().filter(|t| t.enabled)
    }
}
