//! Test modes and the judging seam
//!
//! The three modes share one per-test pipeline (generate, run candidate,
//! classify); they differ only in how a clean candidate run is judged. That
//! difference lives behind [`ModeJudge`], so the worker and runner never
//! branch on the mode.

pub mod benchmark;
pub mod comparison;
pub mod validation;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::compiler::{BuildArtifact, SourceRole};
use crate::config::EngineConfig;
use crate::executor::ExecutionResult;
use crate::languages::ToolchainConfig;
use crate::verdict::{Diagnostic, Outcome};

pub use benchmark::BenchmarkJudge;
pub use comparison::ComparisonJudge;
pub use validation::ValidationJudge;

/// One of the three supported testing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestingMode {
    Benchmark,
    Comparison,
    Validation,
}

impl TestingMode {
    /// Workspace subdirectory owned by this mode
    pub fn dir_name(&self) -> &'static str {
        match self {
            TestingMode::Benchmark => "benchmarker",
            TestingMode::Comparison => "comparator",
            TestingMode::Validation => "validator",
        }
    }

    /// Source roles a run in this mode cannot start without
    pub fn required_roles(&self) -> &'static [SourceRole] {
        match self {
            TestingMode::Benchmark => &[SourceRole::Generator, SourceRole::Candidate],
            TestingMode::Comparison => &[
                SourceRole::Generator,
                SourceRole::Candidate,
                SourceRole::Reference,
            ],
            TestingMode::Validation => &[
                SourceRole::Generator,
                SourceRole::Candidate,
                SourceRole::Validator,
            ],
        }
    }
}

impl std::fmt::Display for TestingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestingMode::Benchmark => "benchmark",
            TestingMode::Comparison => "comparison",
            TestingMode::Validation => "validation",
        };
        write!(f, "{}", s)
    }
}

/// Everything a judge may need about the test under evaluation
pub struct TestContext<'a> {
    pub test_index: usize,
    /// Generated input text
    pub input: &'a str,
    /// Input on disk
    pub input_path: &'a Path,
    /// Candidate output on disk
    pub output_path: &'a Path,
    /// Where this mode stores the reference output, if it produces one
    pub reference_output_path: &'a Path,
    pub artifacts: &'a BTreeMap<SourceRole, BuildArtifact>,
    pub config: &'a EngineConfig,
    pub toolchains: &'a ToolchainConfig,
    cancel: &'a AtomicBool,
}

impl<'a> TestContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        test_index: usize,
        input: &'a str,
        input_path: &'a Path,
        output_path: &'a Path,
        reference_output_path: &'a Path,
        artifacts: &'a BTreeMap<SourceRole, BuildArtifact>,
        config: &'a EngineConfig,
        toolchains: &'a ToolchainConfig,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            test_index,
            input,
            input_path,
            output_path,
            reference_output_path,
            artifacts,
            config,
            toolchains,
            cancel,
        }
    }

    /// Whether the run has been cancelled; checked before every spawn
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// What a judge decided about a clean candidate run
pub struct Judgement {
    pub outcome: Outcome,
    pub diagnostic: Option<Diagnostic>,
    pub reference_time: Option<Duration>,
    pub validator_time: Option<Duration>,
}

impl Judgement {
    pub fn passed() -> Self {
        Self {
            outcome: Outcome::Passed,
            diagnostic: None,
            reference_time: None,
            validator_time: None,
        }
    }
}

/// Mode-specific judging of a candidate run that exited cleanly within its
/// limits. Returns `None` only when cancellation interrupted the judge
/// before its subprocess work.
#[async_trait]
pub trait ModeJudge: Send + Sync {
    fn mode(&self) -> TestingMode;

    async fn judge(
        &self,
        cx: &TestContext<'_>,
        candidate: &ExecutionResult,
    ) -> Option<Judgement>;
}

/// Build the judge for a mode
pub fn judge_for(mode: TestingMode, config: &EngineConfig) -> Box<dyn ModeJudge> {
    match mode {
        TestingMode::Benchmark => Box::new(BenchmarkJudge),
        TestingMode::Comparison => Box::new(ComparisonJudge::new(config.comparison)),
        TestingMode::Validation => Box::new(ValidationJudge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_roles() {
        assert_eq!(
            TestingMode::Benchmark.required_roles(),
            &[SourceRole::Generator, SourceRole::Candidate]
        );
        assert!(TestingMode::Comparison
            .required_roles()
            .contains(&SourceRole::Reference));
        assert!(TestingMode::Validation
            .required_roles()
            .contains(&SourceRole::Validator));
        assert!(!TestingMode::Validation
            .required_roles()
            .contains(&SourceRole::Reference));
    }

    #[test]
    fn test_dir_names() {
        assert_eq!(TestingMode::Benchmark.dir_name(), "benchmarker");
        assert_eq!(TestingMode::Comparison.dir_name(), "comparator");
        assert_eq!(TestingMode::Validation.dir_name(), "validator");
    }
}
