//! Configuration loader for release runs
//!
//! This module reads the pipeline file and the `.env` secrets file, applies
//! command-line overrides, resolves plugin defaults and validates the result
//! into one immutable [`ReleaseConfig`].

use super::config::*;
use crate::core::env::EnvSnapshot;
use crate::core::error::PublishError;
use crate::core::model::{
    AlreadyPublishedMarkers, CommandTemplate, CredentialDelivery, Publishable, ReleaseConfig,
    ReleaseTarget,
};
use crate::core::retry::RetryPolicy;
use crate::plugins::PluginLoader;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Pipeline file name
pub const CONFIG_FILENAME: &str = ".release-pipeline.yaml";

/// Secrets file name
pub const ENV_FILENAME: &str = ".env";

/// Interpreter override for `{interpreter}`
pub const INTERPRETER_ENV: &str = "PYTHON_PATH";

/// Interpreter used when `PYTHON_PATH` is unset
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Supported pipeline schema version
const SCHEMA_VERSION: &str = "1";

/// Starter pipeline written by `init`
pub const STARTER_PIPELINE: &str = r#"# Release pipeline: targets run top to bottom, packages in listed order.
version: "1"

retry:
  maxAttempts: 4
  backoffSecs: 20
  propagationDelaySecs: 45

targets:
  - name: crates-io
    registry: crates-io
    enabled: false
    packages:
      - path: crates/my-macros
      - path: crates/my-core

  - name: pypi
    registry: pypi
    packages:
      - path: crates/my-python

  - name: npm
    registry: npm
    packages:
      - path: crates/my-node
"#;

/// Command-line overrides (highest priority)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub max_attempts: Option<u32>,
    pub backoff_secs: Option<u64>,
    pub propagation_delay_secs: Option<u64>,
    /// Run only these targets
    pub only: Vec<String>,
}

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project root; package paths are relative to it
    pub project_path: PathBuf,

    /// Pipeline file (default: `<project>/.release-pipeline.yaml`)
    pub config_path: Option<PathBuf>,

    /// Secrets file (default: `<project>/.env`, then `<project>/scripts/.env`)
    pub env_file: Option<PathBuf>,

    pub overrides: CliOverrides,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the environment snapshot and the pipeline configuration
    pub async fn load(
        options: ConfigLoadOptions,
    ) -> Result<(ReleaseConfig, EnvSnapshot), PublishError> {
        let env = Self::load_env(
            &options.project_path,
            options.env_file.as_deref(),
            EnvSnapshot::from_process(),
        )
        .await?;

        let config_path = options
            .config_path
            .clone()
            .unwrap_or_else(|| options.project_path.join(CONFIG_FILENAME));
        let file = Self::load_pipeline_file(&config_path).await?;

        let config = Self::resolve(
            file,
            &options.project_path,
            &options.overrides,
            &env,
            &PluginLoader::new(),
        )?;

        Ok((config, env))
    }

    /// Overlay the secrets file onto `base`
    ///
    /// An explicitly given file must exist. Otherwise the project root and
    /// `scripts/` are searched and a missing file is not an error.
    pub async fn load_env(
        project_path: &Path,
        explicit: Option<&Path>,
        mut base: EnvSnapshot,
    ) -> Result<EnvSnapshot, PublishError> {
        let candidate = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => [
                project_path.join(ENV_FILENAME),
                project_path.join("scripts").join(ENV_FILENAME),
            ]
            .into_iter()
            .find(|p| p.is_file()),
        };

        match candidate {
            Some(path) => {
                let count = base.overlay_file(&path).await?;
                tracing::info!(path = %path.display(), count, "loaded env file");
            }
            None => tracing::debug!("no env file found, using process environment only"),
        }

        Ok(base)
    }

    /// Read and parse the pipeline file
    pub async fn load_pipeline_file(path: &Path) -> Result<PipelineFile, PublishError> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            PublishError::config(format!("failed to read {}: {}", path.display(), e))
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            PublishError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Write the starter pipeline into the project
    pub async fn write_starter(project_path: &Path, force: bool) -> Result<PathBuf, PublishError> {
        let path = project_path.join(CONFIG_FILENAME);

        if !force && fs::metadata(&path).await.is_ok() {
            return Err(PublishError::config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }

        fs::write(&path, STARTER_PIPELINE).await.map_err(|e| {
            PublishError::config(format!("failed to write {}: {}", path.display(), e))
        })?;

        Ok(path)
    }

    /// Validate the pipeline file and resolve it against plugin defaults
    pub fn resolve(
        file: PipelineFile,
        project_path: &Path,
        overrides: &CliOverrides,
        env: &EnvSnapshot,
        loader: &PluginLoader,
    ) -> Result<ReleaseConfig, PublishError> {
        if file.version != SCHEMA_VERSION {
            return Err(PublishError::config(format!(
                "unsupported pipeline version {:?} (expected {:?})",
                file.version, SCHEMA_VERSION
            )));
        }

        if file.targets.is_empty() {
            return Err(PublishError::config("at least one target must be defined"));
        }

        let mut seen = HashSet::new();
        for target in &file.targets {
            if target.name.trim().is_empty() {
                return Err(PublishError::config("target name must not be empty"));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(PublishError::config(format!(
                    "duplicate target name {}",
                    target.name
                )));
            }
        }

        if let Some(unknown) = overrides.only.iter().find(|n| !seen.contains(n.as_str())) {
            return Err(PublishError::config(format!("unknown target {}", unknown)));
        }

        let retry = Self::resolve_retry(file.retry.as_ref(), overrides);

        let targets = file
            .targets
            .into_iter()
            .map(|target| Self::resolve_target(target, project_path, &retry, overrides, loader))
            .collect::<Result<Vec<_>, _>>()?;

        let interpreter = env
            .get(INTERPRETER_ENV)
            .unwrap_or(DEFAULT_INTERPRETER)
            .to_string();

        Ok(ReleaseConfig {
            project_path: project_path.to_path_buf(),
            retry,
            interpreter,
            allowed_commands: file.allowed_commands,
            targets,
        })
    }

    fn resolve_retry(file: Option<&RetryConfig>, overrides: &CliOverrides) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let file = file.cloned().unwrap_or_default();

        let max_attempts = overrides
            .max_attempts
            .or(file.max_attempts)
            .unwrap_or(defaults.max_attempts);
        let backoff = overrides
            .backoff_secs
            .or(file.backoff_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.backoff);
        let propagation_delay = overrides
            .propagation_delay_secs
            .or(file.propagation_delay_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.propagation_delay);

        RetryPolicy::new(max_attempts, backoff, propagation_delay)
    }

    fn resolve_target(
        target: TargetConfig,
        project_path: &Path,
        retry: &RetryPolicy,
        overrides: &CliOverrides,
        loader: &PluginLoader,
    ) -> Result<ReleaseTarget, PublishError> {
        let plugin = loader.load_plugin(target.registry);
        let name = target.name;
        let missing = |field: &str| {
            PublishError::config(format!(
                "target {} ({}) requires `{}`",
                name, target.registry, field
            ))
        };

        let token_env = target
            .token_env
            .or_else(|| plugin.default_token_env().map(str::to_string))
            .ok_or_else(|| missing("tokenEnv"))?;

        let credential = match target.credential {
            Some(credential) => Self::resolve_credential(&name, credential)?,
            None => plugin
                .default_credential()
                .ok_or_else(|| missing("credential"))?,
        };

        let command = match target.command {
            Some(command) => CommandTemplate {
                program: command.program,
                args: command.args,
                env: command.env,
            },
            None => plugin.default_command().ok_or_else(|| missing("command"))?,
        };
        if command.program.trim().is_empty() {
            return Err(PublishError::config(format!(
                "target {}: command program must not be empty",
                name
            )));
        }
        let unknown = command.unknown_placeholders();
        if !unknown.is_empty() {
            return Err(PublishError::config(format!(
                "target {}: unknown placeholder(s) {} in command",
                name,
                unknown.join(", ")
            )));
        }

        let markers = match target.already_published_markers {
            Some(markers) => AlreadyPublishedMarkers::new(markers),
            None => AlreadyPublishedMarkers::new(plugin.already_published_markers().iter().copied()),
        }
        .map_err(|e| PublishError::config(format!("target {}: invalid markers: {}", name, e)))?;

        let ordered = target.ordered.unwrap_or_else(|| plugin.ordered_by_default());
        let propagation_delay = match target.propagation_delay_secs {
            Some(secs) => Duration::from_secs(secs),
            None if ordered => retry.propagation_delay,
            None => Duration::ZERO,
        };

        let enabled = target.enabled.unwrap_or(true)
            && (overrides.only.is_empty() || overrides.only.contains(&name));

        if enabled && target.packages.is_empty() {
            return Err(PublishError::config(format!(
                "target {} is enabled but has no packages",
                name
            )));
        }

        let mut package_names = HashSet::new();
        let mut packages = Vec::with_capacity(target.packages.len());
        for (position, package) in target.packages.into_iter().enumerate() {
            if package.path.trim().is_empty() {
                return Err(PublishError::config(format!(
                    "target {}: package path must not be empty",
                    name
                )));
            }

            let package_name = package.name.unwrap_or_else(|| {
                Path::new(&package.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| package.path.clone())
            });
            if !package_names.insert(package_name.clone()) {
                return Err(PublishError::config(format!(
                    "target {}: duplicate package {}",
                    name, package_name
                )));
            }

            packages.push(Publishable {
                name: package_name,
                path: project_path.join(&package.path),
                relative_path: package.path,
                target: name.clone(),
                position,
            });
        }

        Ok(ReleaseTarget {
            kind: target.registry,
            enabled,
            token_env,
            credential,
            command,
            markers,
            ordered,
            propagation_delay,
            packages,
            name,
        })
    }

    fn resolve_credential(
        target: &str,
        credential: CredentialConfig,
    ) -> Result<CredentialDelivery, PublishError> {
        let invalid = |message: &str| {
            PublishError::config(format!("target {}: credential {}", target, message))
        };

        let delivery = match (credential.flag, credential.env, credential.file) {
            (Some(flag), None, None) if !flag.trim().is_empty() => CredentialDelivery::Flag { flag },
            (None, Some(name), None) if !name.trim().is_empty() => CredentialDelivery::Env { name },
            (None, None, Some(file)) => {
                let plain = Path::new(&file)
                    .file_name()
                    .map(|n| n.to_string_lossy() == file.as_str())
                    .unwrap_or(false);
                if !plain {
                    return Err(invalid("file must be a plain file name"));
                }
                let template = credential
                    .template
                    .ok_or_else(|| invalid("file requires a template"))?;
                if !template.contains("{token}") {
                    return Err(invalid("template must contain {token}"));
                }
                CredentialDelivery::File { file, template }
            }
            _ => return Err(invalid("must set exactly one non-empty `flag`, `env` or `file`")),
        };

        Ok(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> PipelineFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn resolve(yaml: &str) -> Result<ReleaseConfig, PublishError> {
        ConfigLoader::resolve(
            parse(yaml),
            Path::new("/work"),
            &CliOverrides::default(),
            &EnvSnapshot::default(),
            &PluginLoader::new(),
        )
    }

    const PIPELINE: &str = r#"
version: "1"
targets:
  - name: crates-io
    registry: crates-io
    enabled: false
    packages:
      - path: crates/app-macros
      - path: crates/app-core
  - name: pypi
    registry: pypi
    packages:
      - path: crates/app-python
  - name: npm
    registry: npm
    packages:
      - name: node
        path: crates/app-node
"#;

    #[test]
    fn test_resolve_applies_plugin_defaults() {
        let config = resolve(PIPELINE).unwrap();

        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.interpreter, DEFAULT_INTERPRETER);
        assert_eq!(config.targets.len(), 3);

        let crates = &config.targets[0];
        assert!(!crates.enabled);
        assert!(crates.ordered);
        assert_eq!(crates.token_env, "CARGO_REGISTRY_TOKEN");
        assert_eq!(crates.propagation_delay, Duration::from_secs(45));
        assert_eq!(crates.packages[1].name, "app-core");
        assert_eq!(crates.packages[1].position, 1);
        assert_eq!(crates.packages[1].path, PathBuf::from("/work/crates/app-core"));

        let pypi = &config.targets[1];
        assert!(pypi.enabled);
        assert!(!pypi.ordered);
        assert_eq!(pypi.propagation_delay, Duration::ZERO);
        assert_eq!(
            pypi.credential,
            CredentialDelivery::Env {
                name: "MATURIN_PYPI_TOKEN".to_string()
            }
        );

        let npm = &config.targets[2];
        assert_eq!(npm.packages[0].name, "node");
        assert!(matches!(npm.credential, CredentialDelivery::File { .. }));
        assert_eq!(
            config.enabled_targets().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["pypi", "npm"]
        );
    }

    #[test]
    fn test_cli_overrides_win_over_file() {
        let yaml = r#"
version: "1"
retry:
  maxAttempts: 2
  backoffSecs: 5
targets:
  - name: npm
    registry: npm
    packages:
      - path: node
  - name: pypi
    registry: pypi
    packages:
      - path: py
"#;
        let overrides = CliOverrides {
            max_attempts: Some(6),
            propagation_delay_secs: Some(0),
            only: vec!["pypi".to_string()],
            ..Default::default()
        };
        let env = EnvSnapshot::from_pairs([(INTERPRETER_ENV, "/opt/python3.12/bin/python")]);

        let config = ConfigLoader::resolve(
            parse(yaml),
            Path::new("/work"),
            &overrides,
            &env,
            &PluginLoader::new(),
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.retry.backoff, Duration::from_secs(5));
        assert_eq!(config.retry.propagation_delay, Duration::ZERO);
        assert_eq!(config.interpreter, "/opt/python3.12/bin/python");
        assert!(!config.targets[0].enabled);
        assert!(config.targets[1].enabled);
    }

    #[test]
    fn test_unknown_only_target_is_rejected() {
        let overrides = CliOverrides {
            only: vec!["rubygems".to_string()],
            ..Default::default()
        };

        let err = ConfigLoader::resolve(
            parse(PIPELINE),
            Path::new("/work"),
            &overrides,
            &EnvSnapshot::default(),
            &PluginLoader::new(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("unknown target rubygems"));
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let err = resolve("version: \"2\"\ntargets: []\n").unwrap_err();
        assert!(err.to_string().contains("unsupported pipeline version"));
    }

    #[test]
    fn test_rejects_empty_targets() {
        assert!(resolve("version: \"1\"\n").is_err());
    }

    #[test]
    fn test_rejects_duplicate_targets() {
        let yaml = r#"
version: "1"
targets:
  - { name: npm, registry: npm, packages: [{ path: a }] }
  - { name: npm, registry: npm, packages: [{ path: b }] }
"#;
        let err = resolve(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate target name npm"));
    }

    #[test]
    fn test_rejects_duplicate_packages() {
        let yaml = r#"
version: "1"
targets:
  - name: crates-io
    registry: crates-io
    packages:
      - path: a/core
      - path: b/core
"#;
        let err = resolve(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate package core"));
    }

    #[test]
    fn test_enabled_target_needs_packages() {
        let yaml = "version: \"1\"\ntargets:\n  - { name: npm, registry: npm }\n";
        assert!(resolve(yaml).is_err());

        let disabled = "version: \"1\"\ntargets:\n  - { name: npm, registry: npm, enabled: false }\n";
        assert!(resolve(disabled).is_ok());
    }

    #[test]
    fn test_custom_target_requires_fields() {
        let yaml = r#"
version: "1"
targets:
  - name: gems
    registry: custom
    tokenEnv: GEM_HOST_API_KEY
    packages: [{ path: ruby }]
"#;
        let err = resolve(yaml).unwrap_err();
        assert!(err.to_string().contains("requires `credential`"));
    }

    #[test]
    fn test_custom_target_resolves() {
        let yaml = r#"
version: "1"
targets:
  - name: gems
    registry: custom
    tokenEnv: GEM_HOST_API_KEY
    credential: { env: GEM_HOST_API_KEY }
    command: { program: gem, args: [push, "{name}.gem"] }
    alreadyPublishedMarkers: ["Repushing of gem versions is not allowed"]
    packages: [{ name: app, path: ruby }]
"#;
        let config = resolve(yaml).unwrap();
        let target = &config.targets[0];

        assert_eq!(target.command.render(), "gem push {name}.gem");
        assert!(target.markers.matches("repushing of gem versions is not allowed"));
        assert!(!target.ordered);
    }

    #[test]
    fn test_rejects_unknown_placeholder() {
        let yaml = r#"
version: "1"
targets:
  - name: npm
    registry: npm
    command: { program: npm, args: [publish, "--otp={otp}"] }
    packages: [{ path: node }]
"#;
        let err = resolve(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown placeholder(s) otp"));
    }

    #[test]
    fn test_resolve_credential_variants() {
        let flag = CredentialConfig {
            flag: Some("--token".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::resolve_credential("t", flag),
            Ok(CredentialDelivery::Flag { .. })
        ));

        let both = CredentialConfig {
            flag: Some("--token".to_string()),
            env: Some("TOKEN".to_string()),
            ..Default::default()
        };
        assert!(ConfigLoader::resolve_credential("t", both).is_err());

        let nested = CredentialConfig {
            file: Some("../.npmrc".to_string()),
            template: Some("{token}".to_string()),
            ..Default::default()
        };
        assert!(ConfigLoader::resolve_credential("t", nested).is_err());

        let no_placeholder = CredentialConfig {
            file: Some(".npmrc".to_string()),
            template: Some("static".to_string()),
            ..Default::default()
        };
        assert!(ConfigLoader::resolve_credential("t", no_placeholder).is_err());
    }

    #[test]
    fn test_explicit_propagation_delay_on_unordered_target() {
        let yaml = r#"
version: "1"
targets:
  - name: pypi
    registry: pypi
    propagationDelaySecs: 30
    packages: [{ path: py }]
"#;
        let config = resolve(yaml).unwrap();
        assert_eq!(config.targets[0].propagation_delay, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_load_env_searches_scripts_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("scripts")).unwrap();
        std::fs::write(temp_dir.path().join("scripts/.env"), "NPM_TOKEN=abc\n").unwrap();

        let env = ConfigLoader::load_env(temp_dir.path(), None, EnvSnapshot::default())
            .await
            .unwrap();

        assert_eq!(env.get("NPM_TOKEN"), Some("abc"));
    }

    #[tokio::test]
    async fn test_load_env_without_file_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let base = EnvSnapshot::from_pairs([("NPM_TOKEN", "process")]);

        let env = ConfigLoader::load_env(temp_dir.path(), None, base).await.unwrap();

        assert_eq!(env.get("NPM_TOKEN"), Some("process"));
    }

    #[tokio::test]
    async fn test_load_env_explicit_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("prod.env");

        let result =
            ConfigLoader::load_env(temp_dir.path(), Some(&missing), EnvSnapshot::default()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_starter_and_reload() {
        let temp_dir = TempDir::new().unwrap();

        let path = ConfigLoader::write_starter(temp_dir.path(), false).await.unwrap();
        assert!(ConfigLoader::write_starter(temp_dir.path(), false).await.is_err());
        assert!(ConfigLoader::write_starter(temp_dir.path(), true).await.is_ok());

        let file = ConfigLoader::load_pipeline_file(&path).await.unwrap();
        let config = ConfigLoader::resolve(
            file,
            temp_dir.path(),
            &CliOverrides::default(),
            &EnvSnapshot::default(),
            &PluginLoader::new(),
        )
        .unwrap();

        assert_eq!(config.targets.len(), 3);
        assert!(!config.targets[0].enabled);
    }
}
