//! Sequencer - Publishes targets and packages in pipeline order
//!
//! Features:
//! - Strictly sequential: one publish command at a time
//! - Targets in pipeline order, packages in their dependency order
//! - Disabled targets are skipped and reported
//! - The first fatal error aborts the rest of the target and all later targets

use crate::core::error::PublishError;
use crate::core::model::ReleaseConfig;
use crate::orchestration::attempt_engine::{AttemptEngine, PublishRecord};
use serde::Serialize;
use std::time::Instant;

/// Why a target did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Disabled,
    PreviousFailure,
}

/// Target that did not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTarget {
    pub name: String,
    pub reason: SkipReason,
}

/// Result of one pass over the pipeline
#[derive(Debug, Default)]
pub struct SequenceResult {
    /// Packages that ran, in execution order
    pub records: Vec<PublishRecord>,

    pub skipped: Vec<SkippedTarget>,

    /// Packages of the failing target that never ran
    pub not_attempted: Vec<String>,

    /// Error that aborted the pipeline
    pub error: Option<PublishError>,
}

impl SequenceResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Sequencer - Drives the attempt engine over the pipeline
pub struct Sequencer<'a> {
    engine: &'a AttemptEngine<'a>,
}

impl<'a> Sequencer<'a> {
    pub fn new(engine: &'a AttemptEngine<'a>) -> Self {
        Self { engine }
    }

    /// Publish every enabled target in order
    pub async fn run(&self, config: &ReleaseConfig) -> SequenceResult {
        let mut result = SequenceResult::default();

        for target in &config.targets {
            if !target.enabled {
                eprintln!("⏭️  Skipping {} (disabled)", target.name);
                result.skipped.push(SkippedTarget {
                    name: target.name.clone(),
                    reason: SkipReason::Disabled,
                });
                continue;
            }

            // Skip if we had a failure
            if result.error.is_some() {
                eprintln!("⏭️  Skipping {} due to previous failure", target.name);
                result.skipped.push(SkippedTarget {
                    name: target.name.clone(),
                    reason: SkipReason::PreviousFailure,
                });
                continue;
            }

            eprintln!(
                "\n📦 {} ({}): {} package(s)",
                target.name,
                target.kind,
                target.packages.len()
            );

            for package in &target.packages {
                if result.error.is_some() {
                    result
                        .not_attempted
                        .push(format!("{}/{}", target.name, package.name));
                    continue;
                }

                let started = Instant::now();
                match self.engine.publish_one(target, package).await {
                    Ok(record) => result.records.push(record),
                    Err(e) => {
                        tracing::error!(
                            code = e.code(),
                            target_name = %target.name,
                            package = %package.name,
                            "{}",
                            e
                        );
                        result.records.push(PublishRecord::failed(
                            &target.name,
                            &package.name,
                            &e,
                            started.elapsed().as_millis() as u64,
                        ));
                        result.error = Some(e);
                    }
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config_loader::{CliOverrides, ConfigLoader};
    use crate::core::env::EnvSnapshot;
    use crate::core::model::CommandInvocation;
    use crate::core::traits::{CommandOutput, CommandRunner, Delay, DelayReason, Outcome};
    use crate::plugins::PluginLoader;
    use crate::security::command_executor::CommandError;
    use crate::security::token_manager::SecureTokenManager;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Fails every attempt for packages whose directory name is listed
    struct DirRunner {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for DirRunner {
        async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, CommandError> {
            let dir = invocation
                .working_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.calls.lock().unwrap().push(dir.clone());

            let exit_code = if self.failing.iter().any(|f| *f == dir) { 1 } else { 0 };
            Ok(CommandOutput {
                exit_code: Some(exit_code),
                output: String::new(),
            })
        }
    }

    struct NoDelay;

    #[async_trait]
    impl Delay for NoDelay {
        async fn sleep(&self, _duration: Duration, _reason: DelayReason) {}
    }

    const PIPELINE: &str = r#"
version: "1"
retry: { maxAttempts: 2 }
targets:
  - name: crates-io
    registry: crates-io
    packages: [{ path: a }, { path: b }, { path: c }]
  - name: docs
    registry: custom
    enabled: false
    tokenEnv: DOCS_TOKEN
    credential: { env: DOCS_TOKEN }
    command: { program: uv, args: [publish] }
    packages: [{ path: d }]
  - name: npm
    registry: npm
    packages: [{ path: e }]
"#;

    async fn run(failing: Vec<&'static str>) -> (SequenceResult, Vec<String>) {
        let temp_dir = TempDir::new().unwrap();
        for dir in ["a", "b", "c", "d", "e"] {
            std::fs::create_dir(temp_dir.path().join(dir)).unwrap();
        }

        let config = ConfigLoader::resolve(
            serde_yaml::from_str(PIPELINE).unwrap(),
            temp_dir.path(),
            &CliOverrides::default(),
            &EnvSnapshot::default(),
            &PluginLoader::new(),
        )
        .unwrap();
        let env = EnvSnapshot::from_pairs([
            ("CARGO_REGISTRY_TOKEN", "cio_secret_token_1"),
            ("NPM_TOKEN", "npm_secret_token_1"),
        ]);
        let tokens = SecureTokenManager::resolve(&config, &env).unwrap();
        let runner = DirRunner {
            failing,
            calls: Mutex::new(Vec::new()),
        };
        let engine = AttemptEngine::new(&runner, &NoDelay, &tokens, config.retry, "python3");

        let result = Sequencer::new(&engine).run(&config).await;
        let calls = runner.calls.lock().unwrap().clone();
        (result, calls)
    }

    #[tokio::test]
    async fn test_runs_in_pipeline_order() {
        let (result, calls) = run(vec![]).await;

        assert!(result.success());
        assert_eq!(calls, vec!["a", "b", "c", "e"]);
        assert_eq!(
            result.skipped,
            vec![SkippedTarget {
                name: "docs".to_string(),
                reason: SkipReason::Disabled
            }]
        );
        assert!(result.records.iter().all(|r| r.outcome == Outcome::Success));
    }

    #[tokio::test]
    async fn test_fatal_failure_aborts_remaining_pipeline() {
        let (result, calls) = run(vec!["b"]).await;

        assert!(!result.success());
        assert_eq!(calls, vec!["a", "b", "b"]);
        assert_eq!(result.not_attempted, vec!["crates-io/c"]);
        assert_eq!(result.skipped[1].name, "npm");
        assert_eq!(result.skipped[1].reason, SkipReason::PreviousFailure);

        let last = result.records.last().unwrap();
        assert_eq!(last.package, "b");
        assert_eq!(last.outcome, Outcome::FatalFailure);
        assert_eq!(last.attempts, 2);
        assert_eq!(result.error.unwrap().code(), "EXHAUSTED_RETRIES");
    }
}
