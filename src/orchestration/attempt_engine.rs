//! Attempt Engine - Publishes one package with bounded retries
//!
//! The retry loop is an explicit state machine:
//!
//! ```text
//! Attempt(1) ──transient──▶ Backoff(1) ──▶ Attempt(2) ── ... ──▶ Attempt(N)
//!     │                                        │                     │
//!     └──success / already published / fatal ──┴─────────▶ Finished(outcome)
//! ```
//!
//! Output text is only inspected by [`classify`]; everything here dispatches
//! on the resulting [`Outcome`].

use crate::core::error::PublishError;
use crate::core::model::{Publishable, ReleaseTarget, TemplateVars};
use crate::core::retry::{RetryPolicy, classify};
use crate::core::traits::{CommandRunner, Delay, DelayReason, Outcome, PublishAttempt};
use crate::security::credential_scope::CredentialScope;
use crate::security::token_manager::SecureTokenManager;
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;

/// Result of publishing one package
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRecord {
    pub target: String,
    pub package: String,
    pub outcome: Outcome,
    /// Number of command executions
    pub attempts: u32,
    pub elapsed_ms: u64,
    /// Per-attempt detail, output masked
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempt_log: Vec<PublishAttempt>,
}

impl PublishRecord {
    /// Record for a package whose publish ended in `error`
    pub fn failed(target: &str, package: &str, error: &PublishError, elapsed_ms: u64) -> Self {
        let attempts = match error {
            PublishError::ExhaustedRetries { attempts, .. } => *attempts,
            _ => 0,
        };

        Self {
            target: target.to_string(),
            package: package.to_string(),
            outcome: Outcome::FatalFailure,
            attempts,
            elapsed_ms,
            attempt_log: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    /// Run attempt `n`
    Attempt(u32),
    /// Wait after transient failure of attempt `n`
    Backoff(u32),
    Finished(Outcome),
}

/// Runs the publish command of one package until it settles
pub struct AttemptEngine<'a> {
    runner: &'a dyn CommandRunner,
    delay: &'a dyn Delay,
    tokens: &'a SecureTokenManager,
    policy: RetryPolicy,
    interpreter: &'a str,
}

impl<'a> AttemptEngine<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        delay: &'a dyn Delay,
        tokens: &'a SecureTokenManager,
        policy: RetryPolicy,
        interpreter: &'a str,
    ) -> Self {
        Self {
            runner,
            delay,
            tokens,
            policy,
            interpreter,
        }
    }

    /// Publish `package` into `target`
    ///
    /// Returns a record for `Success` or `AlreadyPublished`. Retry exhaustion
    /// is `ExhaustedRetries`; a failure to write the credential or to start
    /// the program is `UnexpectedException` and is not retried. The
    /// credential scope is released before the propagation wait.
    pub async fn publish_one(
        &self,
        target: &ReleaseTarget,
        package: &Publishable,
    ) -> Result<PublishRecord, PublishError> {
        let started = Instant::now();
        let token = self.tokens.token_for(&target.name).ok_or_else(|| {
            PublishError::MissingCredential {
                target: target.name.clone(),
                variable: target.token_env.clone(),
            }
        })?;

        let vars = TemplateVars {
            name: &package.name,
            path: &package.relative_path,
            interpreter: self.interpreter,
        };
        let mut invocation = target.command.expand(&vars, package.path.clone());
        let scope = CredentialScope::acquire(&target.name, &target.credential, token, &mut invocation)?;

        eprintln!("📤 [{}] Publishing {}...", target.name, package.name);
        tracing::info!(
            target_name = %target.name,
            package = %package.name,
            command = %target.command.render(),
            "publishing"
        );

        let mut attempts: Vec<PublishAttempt> = Vec::new();
        let mut state = EngineState::Attempt(1);

        let outcome = loop {
            match state {
                EngineState::Attempt(index) => {
                    tracing::debug!(
                        attempt = index,
                        command = %self.tokens.mask_tokens_in_string(&invocation.command_line()),
                        "running publish command"
                    );
                    let started_at = Utc::now();
                    let output = self.runner.run(&invocation).await.map_err(|e| {
                        PublishError::UnexpectedException {
                            target: target.name.clone(),
                            message: format!("{}: {}", package.name, e),
                        }
                    })?;

                    let outcome = classify(&output, index, &self.policy, &target.markers);
                    attempts.push(PublishAttempt {
                        index,
                        exit_code: output.exit_code,
                        output: self.tokens.mask_tokens_in_string(&output.output),
                        outcome,
                        started_at,
                    });

                    state = match outcome {
                        Outcome::TransientFailure => EngineState::Backoff(index),
                        Outcome::Success | Outcome::AlreadyPublished | Outcome::FatalFailure => {
                            EngineState::Finished(outcome)
                        }
                    };
                }
                EngineState::Backoff(index) => {
                    let failure = PublishError::TransientCommandFailure {
                        target: target.name.clone(),
                        package: package.name.clone(),
                        attempt: index,
                        exit_code: attempts.last().and_then(|a| a.exit_code),
                    };
                    tracing::warn!(code = failure.code(), "{}", failure);
                    eprintln!(
                        "  🔁 Attempt {}/{} failed, retrying in {}s...",
                        index,
                        self.policy.max_attempts,
                        self.policy.backoff.as_secs()
                    );

                    self.delay.sleep(self.policy.backoff, DelayReason::Backoff).await;
                    state = EngineState::Attempt(index + 1);
                }
                EngineState::Finished(outcome) => break outcome,
            }
        };

        drop(scope);

        let record = PublishRecord {
            target: target.name.clone(),
            package: package.name.clone(),
            outcome,
            attempts: attempts.len() as u32,
            elapsed_ms: started.elapsed().as_millis() as u64,
            attempt_log: attempts,
        };

        match outcome {
            Outcome::Success => {
                eprintln!("  ✅ Published {}", package.name);
                if !target.propagation_delay.is_zero() {
                    eprintln!(
                        "  ⏳ Waiting {}s for {} propagation...",
                        target.propagation_delay.as_secs(),
                        target.name
                    );
                    self.delay
                        .sleep(target.propagation_delay, DelayReason::Propagation)
                        .await;
                }
                Ok(record)
            }
            Outcome::AlreadyPublished => {
                eprintln!("  ⏭️  {} is already published, skipping", package.name);
                Ok(record)
            }
            Outcome::TransientFailure | Outcome::FatalFailure => {
                let last = record.attempt_log.last();
                eprintln!(
                    "  ❌ {} failed after {} attempt(s)",
                    package.name, record.attempts
                );
                Err(PublishError::ExhaustedRetries {
                    target: target.name.clone(),
                    package: package.name.clone(),
                    attempts: record.attempts,
                    exit_code: last.and_then(|a| a.exit_code),
                    output: last.map(|a| a.output.clone()).unwrap_or_default(),
                })
            }
        }
    }
}
