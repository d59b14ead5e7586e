//! Retry policy and attempt classification
//!
//! A publish attempt is classified from its exit status and output text
//! alone. [`classify`] is the only place where output text is inspected.

use std::time::Duration;

use crate::core::model::AlreadyPublishedMarkers;
use crate::core::traits::{CommandOutput, Outcome};

/// Attempts per publishable unless configured otherwise
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Upper bound for configured attempts
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Wait between a transient failure and the next attempt
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(20);

/// Wait after a successful publish before dependents run
pub const DEFAULT_PROPAGATION_DELAY: Duration = Duration::from_secs(45);

/// Options for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
    /// Default propagation delay for dependency-ordered targets
    pub propagation_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            propagation_delay: DEFAULT_PROPAGATION_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy, clamping attempts to `1..=MAX_ATTEMPTS_LIMIT`
    ///
    /// # Examples
    ///
    /// ```
    /// use publish_orchestrator::core::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(0, Duration::from_secs(5), Duration::ZERO);
    /// assert_eq!(policy.max_attempts, 1);
    /// ```
    pub fn new(max_attempts: u32, backoff: Duration, propagation_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
            backoff,
            propagation_delay,
        }
    }

    /// Whether another attempt may follow `attempt`
    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Classify one attempt
///
/// - exit 0 → `Success`
/// - non-zero and an "already published" marker in the output → `AlreadyPublished`
/// - non-zero with attempts remaining → `TransientFailure`
/// - non-zero on the final attempt → `FatalFailure`
pub fn classify(
    output: &CommandOutput,
    attempt: u32,
    policy: &RetryPolicy,
    markers: &AlreadyPublishedMarkers,
) -> Outcome {
    if output.success() {
        Outcome::Success
    } else if markers.matches(&output.output) {
        Outcome::AlreadyPublished
    } else if policy.has_attempts_after(attempt) {
        Outcome::TransientFailure
    } else {
        Outcome::FatalFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: Option<i32>, text: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            output: text.to_string(),
        }
    }

    fn cargo_markers() -> AlreadyPublishedMarkers {
        AlreadyPublishedMarkers::new(["already exists", "already uploaded"]).unwrap()
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.backoff, Duration::from_secs(20));
        assert_eq!(policy.propagation_delay, Duration::from_secs(45));
    }

    #[test]
    fn test_retry_policy_clamps_attempts() {
        let high = RetryPolicy::new(50, DEFAULT_BACKOFF, DEFAULT_PROPAGATION_DELAY);
        assert_eq!(high.max_attempts, MAX_ATTEMPTS_LIMIT);

        let low = RetryPolicy::new(0, DEFAULT_BACKOFF, DEFAULT_PROPAGATION_DELAY);
        assert_eq!(low.max_attempts, 1);
    }

    #[test]
    fn test_classify_success_ignores_markers() {
        let policy = RetryPolicy::default();
        let outcome = classify(
            &output(Some(0), "warning: crate already exists locally"),
            1,
            &policy,
            &cargo_markers(),
        );
        assert_eq!(outcome, Outcome::Success);
    }

    #[test]
    fn test_classify_already_published_on_any_attempt() {
        let policy = RetryPolicy::default();
        let text = "error: crate version `0.1.5` is already uploaded";

        for attempt in 1..=policy.max_attempts {
            assert_eq!(
                classify(&output(Some(101), text), attempt, &policy, &cargo_markers()),
                Outcome::AlreadyPublished
            );
        }
    }

    #[test]
    fn test_classify_transient_then_fatal() {
        let policy = RetryPolicy::default();
        let failed = output(Some(101), "error: failed to get a 200 OK response");

        assert_eq!(
            classify(&failed, 1, &policy, &cargo_markers()),
            Outcome::TransientFailure
        );
        assert_eq!(
            classify(&failed, 3, &policy, &cargo_markers()),
            Outcome::TransientFailure
        );
        assert_eq!(
            classify(&failed, 4, &policy, &cargo_markers()),
            Outcome::FatalFailure
        );
    }

    #[test]
    fn test_classify_signal_termination_is_failure() {
        let policy = RetryPolicy::new(1, DEFAULT_BACKOFF, DEFAULT_PROPAGATION_DELAY);
        assert_eq!(
            classify(&output(None, ""), 1, &policy, &cargo_markers()),
            Outcome::FatalFailure
        );
    }

    #[test]
    fn test_classify_npm_fixture() {
        let markers =
            AlreadyPublishedMarkers::new(["cannot publish over the previously published versions"])
                .unwrap();
        let fixture = "npm ERR! code E403\n\
                       npm ERR! 403 403 Forbidden - PUT https://registry.npmjs.org/app-node - \
                       You cannot publish over the previously published versions: 0.1.5.";

        assert_eq!(
            classify(&output(Some(1), fixture), 1, &RetryPolicy::default(), &markers),
            Outcome::AlreadyPublished
        );
    }

    #[test]
    fn test_classify_pypi_fixture() {
        let markers = AlreadyPublishedMarkers::new(["file already exists"]).unwrap();
        let fixture = "💥 maturin failed\n  Caused by: Failed to upload the wheel\n  \
                       Upload failed with status 400: File already exists.";

        assert_eq!(
            classify(&output(Some(1), fixture), 2, &RetryPolicy::default(), &markers),
            Outcome::AlreadyPublished
        );
    }
}
