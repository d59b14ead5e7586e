//! Orchestration layer for release runs
//!
//! This module provides the attempt engine, the sequencer and the release
//! runner that composes them with the pre-flight checks.

pub mod attempt_engine;
pub mod release_runner;
pub mod sequencer;

// Re-export main types for convenience
pub use attempt_engine::{AttemptEngine, PublishRecord};
pub use release_runner::{FailureSummary, PipelinePlan, PlannedTarget, ReleaseRunner, RunReport};
pub use sequencer::{SequenceResult, Sequencer, SkipReason, SkippedTarget};
