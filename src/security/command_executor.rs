//! SafeCommandExecutor: allowlisted execution of publish commands
//!
//! # Security Features
//!
//! - **Allowlist validation**: Only known publish tools (plus programs the
//!   pipeline file opts into) can execute
//! - **Injection prevention**: Uses `tokio::process::Command`; arguments are
//!   passed as a vector, never interpolated into a shell string
//! - **Working directory validation**: Checked before every execution
//! - **Scoped environment**: Credential variables are set on the child only,
//!   never on the orchestrator process
//!
//! # Example
//!
//! ```rust,no_run
//! use publish_orchestrator::core::{CommandInvocation, CommandRunner};
//! use publish_orchestrator::security::SafeCommandExecutor;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = SafeCommandExecutor::new();
//! let invocation = CommandInvocation {
//!     program: "npm".to_string(),
//!     args: vec!["--version".to_string()],
//!     env: Vec::new(),
//!     working_dir: std::env::temp_dir(),
//! };
//!
//! let output = executor.run(&invocation).await?;
//! println!("{}", output.output);
//! # Ok(())
//! # }
//! ```

use crate::core::model::CommandInvocation;
use crate::core::traits::{CommandOutput, CommandRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Publish tools that may always be executed.
///
/// Anything else must be listed under `allowedCommands` in the pipeline file.
const ALLOWED_COMMANDS: &[&str] = &[
    "cargo", "maturin", "npm", "pnpm", "yarn", "twine", "python", "python3", "pip", "uv",
    "poetry",
];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowlist
    #[error("Command '{0}' is not in the allowed list")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not a directory
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command could not be started (e.g., binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),
}

/// Safe command executor with an allowlist
#[derive(Debug, Clone, Default)]
pub struct SafeCommandExecutor {
    /// Programs allowed in addition to `ALLOWED_COMMANDS`
    extra_allowed: Vec<String>,
}

impl SafeCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also allow these programs
    pub fn with_allowed<I, S>(mut self, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_allowed
            .extend(programs.into_iter().map(Into::into));
        self
    }

    /// Check a program against the allowlist
    pub fn is_allowed(&self, program: &str) -> bool {
        ALLOWED_COMMANDS.contains(&program) || self.extra_allowed.iter().any(|p| p == program)
    }

    fn program_name(program: &str) -> String {
        // npm, yarn and pnpm are .cmd shims on Windows, not .exe
        #[cfg(target_os = "windows")]
        let name = if matches!(program, "npm" | "yarn" | "pnpm") {
            format!("{}.cmd", program)
        } else {
            program.to_string()
        };

        #[cfg(not(target_os = "windows"))]
        let name = program.to_string();

        name
    }
}

#[async_trait]
impl CommandRunner for SafeCommandExecutor {
    fn allows(&self, program: &str) -> bool {
        self.is_allowed(program)
    }

    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, CommandError> {
        if !self.is_allowed(&invocation.program) {
            return Err(CommandError::CommandNotAllowed(invocation.program.clone()));
        }

        if !invocation.working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(
                invocation.working_dir.clone(),
            ));
        }

        let output = Command::new(Self::program_name(&invocation.program))
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(CommandOutput {
            exit_code: output.status.code(),
            output: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(program: &str, args: &[&str]) -> CommandInvocation {
        CommandInvocation {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: Vec::new(),
            working_dir: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn test_rejected_command_rm() {
        let executor = SafeCommandExecutor::new();
        let result = executor.run(&invocation("rm", &["-rf", "/"])).await;

        assert!(
            matches!(result, Err(CommandError::CommandNotAllowed(_))),
            "rm should be rejected as not in the allowlist"
        );
    }

    #[tokio::test]
    async fn test_invalid_working_directory() {
        let executor = SafeCommandExecutor::new();
        let mut inv = invocation("npm", &["publish"]);
        inv.working_dir = PathBuf::from("/nonexistent/directory/that/does/not/exist");

        let result = executor.run(&inv).await;
        assert!(matches!(
            result,
            Err(CommandError::InvalidWorkingDirectory(_))
        ));
    }

    #[test]
    fn test_extra_allowed_programs() {
        let executor = SafeCommandExecutor::new().with_allowed(["gem"]);

        assert!(executor.is_allowed("gem"));
        assert!(executor.is_allowed("maturin"));
        assert!(!executor.is_allowed("sh"));
        assert!(executor.allows("gem"));
        assert!(!SafeCommandExecutor::new().allows("gem"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_exit_code_and_combined_output() {
        let executor = SafeCommandExecutor::new().with_allowed(["sh"]);
        let mut inv = invocation("sh", &["-c", "echo out; echo \"$SCOPED\" >&2; exit 3"]);
        inv.env = vec![("SCOPED".to_string(), "from-child".to_string())];

        let output = executor.run(&inv).await.unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(output.output.contains("out"));
        assert!(output.output.contains("from-child"));
        assert!(std::env::var("SCOPED").is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_execution_failure() {
        let executor = SafeCommandExecutor::new().with_allowed(["definitely-not-a-real-tool"]);
        let result = executor
            .run(&invocation("definitely-not-a-real-tool", &[]))
            .await;

        assert!(matches!(result, Err(CommandError::ExecutionFailed(_))));
    }
}
