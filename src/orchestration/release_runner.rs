//! Release Runner - Main orchestrator for a release run
//!
//! Manages the complete workflow:
//! - Credential resolution for every enabled target (pre-flight)
//! - Package and dependency order checks (pre-flight)
//! - Sequenced publishing with retries and propagation delays
//! - Summary reporting and JSON report

use crate::core::env::EnvSnapshot;
use crate::core::error::PublishError;
use crate::core::model::{RegistryKind, ReleaseConfig, TemplateVars};
use crate::core::traits::{CommandRunner, Delay, Outcome};
use crate::orchestration::attempt_engine::{AttemptEngine, PublishRecord};
use crate::orchestration::sequencer::{Sequencer, SkipReason, SkippedTarget};
use crate::plugins::PluginLoader;
use crate::security::token_manager::{CredentialStatus, SecureTokenManager};
use crate::validation::DependencyChecker;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Serializable description of the error that ended a run
#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub suggested_actions: Vec<String>,
    pub preflight: bool,
}

impl From<&PublishError> for FailureSummary {
    fn from(error: &PublishError) -> Self {
        Self {
            code: error.code().to_string(),
            target: error.target().map(str::to_string),
            message: error.to_string(),
            output: error.diagnostic_output().map(str::to_string),
            suggested_actions: error
                .suggested_actions()
                .into_iter()
                .map(str::to_string)
                .collect(),
            preflight: error.is_preflight(),
        }
    }
}

/// Report of one release run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub records: Vec<PublishRecord>,
    pub skipped: Vec<SkippedTarget>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_attempted: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
}

impl RunReport {
    /// Records with the given outcome
    pub fn with_outcome(&self, outcome: Outcome) -> impl Iterator<Item = &PublishRecord> {
        self.records.iter().filter(move |r| r.outcome == outcome)
    }

    /// Total number of publish command executions
    pub fn total_attempts(&self) -> u32 {
        self.records.iter().map(|r| r.attempts).sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Print the run summary
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("📊 Release Summary");
        println!("{}", "=".repeat(60));

        let published: Vec<_> = self.with_outcome(Outcome::Success).collect();
        println!("\n✅ Published: {}", published.len());
        for record in published {
            println!(
                "   - {}/{} ({} attempt(s), {}ms)",
                record.target, record.package, record.attempts, record.elapsed_ms
            );
        }

        let existing: Vec<_> = self.with_outcome(Outcome::AlreadyPublished).collect();
        if !existing.is_empty() {
            println!("\n⏭️  Already published: {}", existing.len());
            for record in existing {
                println!("   - {}/{}", record.target, record.package);
            }
        }

        if !self.skipped.is_empty() {
            println!("\n⏭️  Skipped targets: {}", self.skipped.len());
            for skipped in &self.skipped {
                let reason = match skipped.reason {
                    SkipReason::Disabled => "disabled",
                    SkipReason::PreviousFailure => "previous failure",
                };
                println!("   - {} ({})", skipped.name, reason);
            }
        }

        if let Some(ref failure) = self.failure {
            println!("\n❌ Failed: [{}] {}", failure.code, failure.message);
            if let Some(ref output) = failure.output {
                println!("\n--- captured output ---\n{}", output.trim_end());
                println!("-----------------------");
            }
            if !failure.suggested_actions.is_empty() {
                println!("\n💡 Suggested actions:");
                for action in &failure.suggested_actions {
                    println!("   - {}", action);
                }
            }
        }

        println!("\n{}", "=".repeat(60));
        println!(
            "Overall Status: {} in {:.1}s",
            if self.success { "✅ SUCCESS" } else { "❌ FAILED" },
            self.duration_ms as f64 / 1000.0
        );
        println!("{}\n", "=".repeat(60));
    }
}

/// One target as it would run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTarget {
    pub name: String,
    pub registry: RegistryKind,
    pub enabled: bool,
    pub command: String,
    pub credential: String,
    pub ordered: bool,
    pub propagation_delay_secs: u64,
    pub packages: Vec<String>,
}

/// Resolved pipeline without side effects
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelinePlan {
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub targets: Vec<PlannedTarget>,
    pub credentials: Vec<CredentialStatus>,
}

impl PipelinePlan {
    /// Whether every enabled target has its token
    pub fn ready(&self) -> bool {
        self.credentials.iter().all(|c| c.present)
    }

    pub fn print(&self) {
        println!(
            "\n📋 Release plan (max {} attempt(s), {}s backoff)\n",
            self.max_attempts, self.backoff_secs
        );

        for (index, target) in self.targets.iter().enumerate() {
            let state = if target.enabled { "" } else { " [disabled]" };
            println!("{}. {} ({}){}", index + 1, target.name, target.registry, state);
            println!("   command:    {}", target.command);
            println!("   credential: {}", target.credential);
            if target.propagation_delay_secs > 0 {
                println!("   propagation delay: {}s", target.propagation_delay_secs);
            }
            for (position, package) in target.packages.iter().enumerate() {
                let marker = if target.ordered { format!("{}.", position + 1) } else { "-".to_string() };
                println!("     {} {}", marker, package);
            }
        }

        println!("\n🔑 Credentials:");
        for status in &self.credentials {
            let icon = if status.present { "✅" } else { "❌" };
            println!("   {} {} ({})", icon, status.variable, status.target);
        }
        println!();
    }
}

/// Release runner - composes pre-flight checks and the sequencer
pub struct ReleaseRunner<'a> {
    runner: &'a dyn CommandRunner,
    delay: &'a dyn Delay,
    plugin_loader: PluginLoader,
}

impl<'a> ReleaseRunner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, delay: &'a dyn Delay) -> Self {
        Self {
            runner,
            delay,
            plugin_loader: PluginLoader::new(),
        }
    }

    /// Describe the pipeline and credential status
    pub fn plan(config: &ReleaseConfig, env: &EnvSnapshot) -> PipelinePlan {
        let targets = config
            .targets
            .iter()
            .map(|target| PlannedTarget {
                name: target.name.clone(),
                registry: target.kind,
                enabled: target.enabled,
                command: target.command.render(),
                credential: format!("{} via {}", target.token_env, target.credential.describe()),
                ordered: target.ordered,
                propagation_delay_secs: target.propagation_delay.as_secs(),
                packages: target
                    .packages
                    .iter()
                    .map(|p| format!("{} ({})", p.name, p.relative_path))
                    .collect(),
            })
            .collect();

        PipelinePlan {
            max_attempts: config.retry.max_attempts,
            backoff_secs: config.retry.backoff.as_secs(),
            targets,
            credentials: SecureTokenManager::status(config, env),
        }
    }

    /// Run the release pipeline
    pub async fn run(&self, config: &ReleaseConfig, env: &EnvSnapshot) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("release", %run_id);

        self.run_inner(run_id, config, env).instrument(span).await
    }

    /// Run the release pipeline unless `shutdown` completes first
    ///
    /// Returns `None` when interrupted. The in-flight publish is dropped, which
    /// removes its credential file and kills its child process.
    pub async fn run_until<F>(
        &self,
        config: &ReleaseConfig,
        env: &EnvSnapshot,
        shutdown: F,
    ) -> Option<RunReport>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            report = self.run(config, env) => Some(report),
            () = shutdown => {
                tracing::warn!("release run interrupted");
                None
            }
        }
    }

    async fn run_inner(&self, run_id: Uuid, config: &ReleaseConfig, env: &EnvSnapshot) -> RunReport {
        let started_at = Utc::now();
        let start_time = Instant::now();
        tracing::info!(targets = config.targets.len(), "release run started");

        let mut report = RunReport {
            run_id,
            success: false,
            started_at,
            duration_ms: 0,
            records: Vec::new(),
            skipped: Vec::new(),
            not_attempted: Vec::new(),
            failure: None,
        };

        let tokens = match self.preflight(config, env).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(code = e.code(), "pre-flight failed: {}", e);
                report.skipped = config
                    .targets
                    .iter()
                    .map(|t| SkippedTarget {
                        name: t.name.clone(),
                        reason: if t.enabled {
                            SkipReason::PreviousFailure
                        } else {
                            SkipReason::Disabled
                        },
                    })
                    .collect();
                report.failure = Some(FailureSummary::from(&e));
                report.duration_ms = start_time.elapsed().as_millis() as u64;
                return report;
            }
        };

        let engine = AttemptEngine::new(
            self.runner,
            self.delay,
            &tokens,
            config.retry,
            &config.interpreter,
        );
        let result = Sequencer::new(&engine).run(config).await;

        report.success = result.success();
        report.failure = result.error.as_ref().map(FailureSummary::from);
        report.records = result.records;
        report.skipped = result.skipped;
        report.not_attempted = result.not_attempted;
        report.duration_ms = start_time.elapsed().as_millis() as u64;

        tracing::info!(
            success = report.success,
            attempts = report.total_attempts(),
            duration_ms = report.duration_ms,
            "release run finished"
        );
        report
    }

    /// Check commands, resolve credentials, then check packages of every
    /// enabled target
    async fn preflight(
        &self,
        config: &ReleaseConfig,
        env: &EnvSnapshot,
    ) -> Result<SecureTokenManager, PublishError> {
        self.check_commands(config)?;

        eprintln!("🔑 Resolving credentials...");
        let tokens = SecureTokenManager::resolve(config, env)?;
        eprintln!("  ✅ {} credential(s) resolved", tokens.len());

        eprintln!("🔍 Checking packages...");
        let checker = DependencyChecker::new();
        for target in config.enabled_targets() {
            let plugin = self.plugin_loader.load_plugin(target.kind);
            checker.check_target(target, plugin.as_ref()).await?;
        }
        eprintln!("  ✅ Packages and dependency order verified");

        Ok(tokens)
    }

    /// Every expanded program of an enabled target must be runnable
    fn check_commands(&self, config: &ReleaseConfig) -> Result<(), PublishError> {
        for target in config.enabled_targets() {
            for package in &target.packages {
                let vars = TemplateVars {
                    name: &package.name,
                    path: &package.relative_path,
                    interpreter: &config.interpreter,
                };
                let program = target.command.expand(&vars, package.path.clone()).program;
                if !self.runner.allows(&program) {
                    return Err(PublishError::config(format!(
                        "target {}: command `{}` is not allowed (add it to allowedCommands)",
                        target.name, program
                    )));
                }
            }
        }
        Ok(())
    }
}
