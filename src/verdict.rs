//! Test verdicts and run summaries

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classified outcome of one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    TimedOut,
    MemoryExceeded,
    RuntimeError,
    /// The validator itself malfunctioned; never counted as a candidate
    /// failure
    ValidatorError,
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::TimedOut => "timed_out",
            Outcome::MemoryExceeded => "memory_exceeded",
            Outcome::RuntimeError => "runtime_error",
            Outcome::ValidatorError => "validator_error",
        };
        write!(f, "{}", s)
    }
}

/// Structured explanation attached to a non-passing verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Token-wise comparison found its first difference
    TokenMismatch {
        /// 1-based position of the first differing token
        position: usize,
        expected: Option<String>,
        actual: Option<String>,
    },
    /// Exact comparison failed; both outputs for operator inspection
    OutputMismatch { expected: String, actual: String },
    /// A stage crashed or could not be run; captured stderr
    StageFailure { stage: String, message: String },
    /// Validator exit code and its message stream
    ValidatorExit {
        exit_code: i32,
        message: Option<String>,
    },
}

/// Wall-clock time spent in each stage of one test
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub generator: Duration,
    pub candidate: Duration,
    pub reference: Option<Duration>,
    pub validator: Option<Duration>,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.generator
            + self.candidate
            + self.reference.unwrap_or_default()
            + self.validator.unwrap_or_default()
    }
}

/// Maximum characters kept in a display preview
const PREVIEW_LIMIT: usize = 300;

/// Result of one test case. Created once by a worker, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVerdict {
    pub test_index: usize,
    pub outcome: Outcome,
    /// Full generated input
    pub input: String,
    /// Full candidate output
    pub output: String,
    pub diagnostic: Option<Diagnostic>,
    pub timings: StageTimings,
    /// Peak candidate RSS in KB, when the sampler saw the process
    pub peak_memory_kb: Option<u64>,
}

impl TestVerdict {
    /// Input truncated for display
    pub fn input_preview(&self) -> String {
        preview(&self.input)
    }

    /// Output truncated for display
    pub fn output_preview(&self) -> String {
        preview(&self.output)
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > PREVIEW_LIMIT {
        let truncated: String = trimmed.chars().take(PREVIEW_LIMIT).collect();
        format!("{}...", truncated)
    } else {
        trimmed.to_string()
    }
}

/// Aggregated result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of tests requested
    pub requested: usize,
    /// Verdicts ordered by completion time; re-sort by `test_index` for
    /// deterministic reporting
    pub verdicts: Vec<TestVerdict>,
    pub cancelled: bool,
    /// Every verdict passed and the run was not cancelled
    pub overall_passed: bool,
    /// Compiler stderr when the run never started
    pub build_failure: Option<String>,
}

impl RunSummary {
    pub fn statistics(&self) -> RunStatistics {
        let total = self.verdicts.len();
        let passed = self.verdicts.iter().filter(|v| v.outcome.is_pass()).count();

        let times: Vec<Duration> = self.verdicts.iter().map(|v| v.timings.candidate).collect();
        let (min_time, max_time, avg_time) = if times.is_empty() {
            (None, None, None)
        } else {
            let sum: Duration = times.iter().sum();
            (
                times.iter().min().copied(),
                times.iter().max().copied(),
                Some(sum / times.len() as u32),
            )
        };

        RunStatistics {
            total,
            passed,
            failed: total - passed,
            pass_rate: if total == 0 {
                0.0
            } else {
                passed as f64 / total as f64 * 100.0
            },
            min_candidate_time: min_time,
            avg_candidate_time: avg_time,
            max_candidate_time: max_time,
        }
    }
}

/// Pass/fail counts and candidate timing spread over a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub min_candidate_time: Option<Duration>,
    pub avg_candidate_time: Option<Duration>,
    pub max_candidate_time: Option<Duration>,
}
