//! Per-test execution pipeline
//!
//! Every test case, in every mode, runs the same pipeline: generate an
//! input, run the candidate on it under limits, classify the raw result,
//! then let the mode's judge look at a clean run. Returns `None` when
//! cancellation stopped the test before it produced a verdict.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::compiler::{BuildArtifact, SourceRole};
use crate::config::EngineConfig;
use crate::executor::{self, ExecutionRequest, StdinSource, StdoutSink};
use crate::languages::ToolchainConfig;
use crate::modes::{ModeJudge, TestContext, TestingMode};
use crate::verdict::{Diagnostic, Outcome, StageTimings, TestVerdict};
use crate::workspace::Workspace;

/// State shared by every test task of one run
pub struct RunContext {
    pub mode: TestingMode,
    pub config: EngineConfig,
    pub toolchains: Arc<ToolchainConfig>,
    pub workspace: Workspace,
    pub artifacts: BTreeMap<SourceRole, BuildArtifact>,
    pub judge: Box<dyn ModeJudge>,
    pub cancel: Arc<AtomicBool>,
}

impl RunContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Run one test case end to end
pub async fn run_test(cx: Arc<RunContext>, test_index: usize) -> Option<TestVerdict> {
    if cx.cancelled() {
        return None;
    }

    let input_path = cx.workspace.input_path(cx.mode, test_index);
    let output_path = cx.workspace.output_path(cx.mode, test_index);
    let reference_output_path = cx.workspace.reference_output_path(cx.mode, test_index);

    let mut timings = StageTimings::default();

    // Stage 1: generator produces the input, straight to its file
    let Some(generator) = cx.artifacts.get(&SourceRole::Generator) else {
        return Some(error_verdict(test_index, "generator", "no generator artifact".into()));
    };

    let request = ExecutionRequest::new(
        generator.run_command(&cx.toolchains, &[test_index.to_string()]),
    )
    .with_stdout(StdoutSink::File(input_path.clone()))
    .with_time_limit(cx.config.generator_time_limit);

    let generated = match executor::execute(&request).await {
        Ok(result) => result,
        Err(e) => {
            return Some(error_verdict(test_index, "generator", e.to_string()));
        }
    };
    timings.generator = generated.wall_time;

    if !generated.is_success() {
        let message = if generated.timed_out {
            "generator timed out".to_string()
        } else if !generated.stderr.is_empty() {
            generated.stderr
        } else {
            format!("generator exited with code {}", generated.exit_code)
        };
        let mut verdict = error_verdict(test_index, "generator", message);
        verdict.timings = timings;
        return Some(verdict);
    }

    let input = match tokio::fs::read_to_string(&input_path).await {
        Ok(input) => input,
        Err(e) => {
            return Some(error_verdict(
                test_index,
                "generator",
                format!("cannot read generated input: {}", e),
            ));
        }
    };

    if cx.cancelled() {
        return None;
    }

    // Stage 2: candidate under the configured limits
    let Some(candidate) = cx.artifacts.get(&SourceRole::Candidate) else {
        return Some(error_verdict(test_index, "candidate", "no candidate artifact".into()));
    };

    let request = ExecutionRequest::new(candidate.run_command(&cx.toolchains, &[]))
        .with_stdin(StdinSource::File(input_path.clone()))
        .with_time_limit(cx.config.time_limit)
        .with_memory_limit_kb(cx.config.memory_limit_kb);

    let run = match executor::execute(&request).await {
        Ok(result) => result,
        Err(e) => {
            let mut verdict = error_verdict(test_index, "candidate", e.to_string());
            verdict.input = input;
            verdict.timings = timings;
            return Some(verdict);
        }
    };
    timings.candidate = run.wall_time;

    if let Err(e) = tokio::fs::write(&output_path, &run.stdout).await {
        // The verdict still carries the output; only the on-disk copy is lost
        warn!("Failed to save output for test {}: {}", test_index, e);
    }

    // Stage 3: classify the raw result; memory beats timeout, both beat the
    // exit code
    let classified = if run.memory_exceeded {
        Some((Outcome::MemoryExceeded, None))
    } else if run.timed_out {
        Some((Outcome::TimedOut, None))
    } else if run.exit_code != 0 {
        let message = if run.stderr.is_empty() {
            format!("candidate exited with code {}", run.exit_code)
        } else {
            run.stderr.clone()
        };
        Some((
            Outcome::RuntimeError,
            Some(Diagnostic::StageFailure {
                stage: "candidate".into(),
                message,
            }),
        ))
    } else {
        None
    };

    if let Some((outcome, diagnostic)) = classified {
        debug!("Test {}: {}", test_index, outcome);
        return Some(TestVerdict {
            test_index,
            outcome,
            input,
            output: run.stdout,
            diagnostic,
            timings,
            peak_memory_kb: run.peak_memory_kb,
        });
    }

    // Stage 4: mode-specific judging of the clean run
    let test_cx = TestContext::new(
        test_index,
        &input,
        &input_path,
        &output_path,
        &reference_output_path,
        &cx.artifacts,
        &cx.config,
        &cx.toolchains,
        &cx.cancel,
    );

    let judgement = cx.judge.judge(&test_cx, &run).await?;
    timings.reference = judgement.reference_time;
    timings.validator = judgement.validator_time;

    debug!("Test {}: {}", test_index, judgement.outcome);

    Some(TestVerdict {
        test_index,
        outcome: judgement.outcome,
        input,
        output: run.stdout,
        diagnostic: judgement.diagnostic,
        timings,
        peak_memory_kb: run.peak_memory_kb,
    })
}

fn error_verdict(test_index: usize, stage: &str, message: String) -> TestVerdict {
    TestVerdict {
        test_index,
        outcome: Outcome::RuntimeError,
        input: String::new(),
        output: String::new(),
        diagnostic: Some(Diagnostic::StageFailure {
            stage: stage.to_string(),
            message,
        }),
        timings: StageTimings::default(),
        peak_memory_kb: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::Language;
    use crate::modes::judge_for;
    use crate::strategy::ArtifactKind;
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Shell scripts standing in for interpreted sources: the test toolchain
    /// points the python interpreter at `sh`.
    fn sh_toolchains() -> Arc<ToolchainConfig> {
        let mut config = ToolchainConfig::default();
        config.python.interpreter = "sh".into();
        config.python.flags = vec![];
        Arc::new(config)
    }

    fn script_artifact(dir: &Path, role: SourceRole, body: &str) -> BuildArtifact {
        let path = dir.join(format!("{}.py", role));
        std::fs::write(&path, body).unwrap();
        BuildArtifact {
            role,
            language: Language::Python,
            kind: ArtifactKind::SourceItself,
            path,
            source_mtime: SystemTime::now(),
        }
    }

    fn context(
        dir: &Path,
        mode: TestingMode,
        config: EngineConfig,
        scripts: &[(SourceRole, &str)],
    ) -> Arc<RunContext> {
        let workspace = Workspace::new(dir);
        workspace.ensure_mode_dirs(mode).unwrap();

        let mode_dir = workspace.mode_dir(mode);
        let artifacts = scripts
            .iter()
            .map(|(role, body)| (*role, script_artifact(&mode_dir, *role, body)))
            .collect();

        let judge = judge_for(mode, &config);
        Arc::new(RunContext {
            mode,
            config,
            toolchains: sh_toolchains(),
            workspace,
            artifacts,
            judge,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    #[tokio::test]
    async fn test_benchmark_clean_run_passes() {
        let dir = TempDir::new().unwrap();
        let cx = context(
            dir.path(),
            TestingMode::Benchmark,
            EngineConfig::default(),
            &[
                (SourceRole::Generator, "echo '5'\necho '1 2 3 4 5'\n"),
                (SourceRole::Candidate, "cat\n"),
            ],
        );

        let verdict = run_test(cx.clone(), 0).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::Passed);
        assert_eq!(verdict.input, "5\n1 2 3 4 5\n");
        assert_eq!(verdict.output, "5\n1 2 3 4 5\n");
        assert!(cx.workspace.input_path(TestingMode::Benchmark, 0).exists());
        assert!(cx.workspace.output_path(TestingMode::Benchmark, 0).exists());
    }

    #[tokio::test]
    async fn test_generator_receives_test_index() {
        let dir = TempDir::new().unwrap();
        let cx = context(
            dir.path(),
            TestingMode::Benchmark,
            EngineConfig::default(),
            &[
                (SourceRole::Generator, "echo \"case $1\"\n"),
                (SourceRole::Candidate, "cat\n"),
            ],
        );

        let verdict = run_test(cx, 7).await.unwrap();
        assert_eq!(verdict.input, "case 7\n");
    }

    #[tokio::test]
    async fn test_candidate_timeout_is_timed_out() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            time_limit: Duration::from_millis(300),
            ..EngineConfig::default()
        };
        let cx = context(
            dir.path(),
            TestingMode::Benchmark,
            config,
            &[
                (SourceRole::Generator, "echo go\n"),
                (SourceRole::Candidate, "sleep 5\n"),
            ],
        );

        let verdict = run_test(cx, 0).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::TimedOut);
        assert!(verdict.timings.candidate >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_candidate_crash_is_runtime_error() {
        let dir = TempDir::new().unwrap();
        let cx = context(
            dir.path(),
            TestingMode::Benchmark,
            EngineConfig::default(),
            &[
                (SourceRole::Generator, "echo go\n"),
                (SourceRole::Candidate, "echo 'segfault' >&2\nexit 7\n"),
            ],
        );

        let verdict = run_test(cx, 0).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::RuntimeError);
        match verdict.diagnostic {
            Some(Diagnostic::StageFailure { ref stage, ref message }) => {
                assert_eq!(stage, "candidate");
                assert!(message.contains("segfault"));
            }
            ref other => panic!("expected StageFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generator_failure_is_runtime_error() {
        let dir = TempDir::new().unwrap();
        let cx = context(
            dir.path(),
            TestingMode::Benchmark,
            EngineConfig::default(),
            &[
                (SourceRole::Generator, "echo 'gen broke' >&2\nexit 1\n"),
                (SourceRole::Candidate, "cat\n"),
            ],
        );

        let verdict = run_test(cx, 0).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::RuntimeError);
        match verdict.diagnostic {
            Some(Diagnostic::StageFailure { ref stage, ref message }) => {
                assert_eq!(stage, "generator");
                assert!(message.contains("gen broke"));
            }
            ref other => panic!("expected StageFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start_yields_no_verdict() {
        let dir = TempDir::new().unwrap();
        let cx = context(
            dir.path(),
            TestingMode::Benchmark,
            EngineConfig::default(),
            &[
                (SourceRole::Generator, "echo go\n"),
                (SourceRole::Candidate, "cat\n"),
            ],
        );
        cx.cancel.store(true, Ordering::Relaxed);

        assert!(run_test(cx, 0).await.is_none());
    }

    #[tokio::test]
    async fn test_comparison_mismatch_carries_token_position() {
        let dir = TempDir::new().unwrap();
        let cx = context(
            dir.path(),
            TestingMode::Comparison,
            EngineConfig::default(),
            &[
                (SourceRole::Generator, "echo '5'\necho '1 2 3 4 5'\n"),
                (SourceRole::Candidate, "echo '1 2 3 4 6'\n"),
                (SourceRole::Reference, "echo '1 2 3 4 5'\n"),
            ],
        );

        let verdict = run_test(cx, 0).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::Failed);
        match verdict.diagnostic {
            Some(Diagnostic::TokenMismatch {
                position,
                ref expected,
                ref actual,
            }) => {
                assert_eq!(position, 5);
                assert_eq!(expected.as_deref(), Some("5"));
                assert_eq!(actual.as_deref(), Some("6"));
            }
            ref other => panic!("expected TokenMismatch, got {:?}", other),
        }
        assert!(verdict.timings.reference.is_some());
    }

    #[tokio::test]
    async fn test_validation_reads_both_files() {
        let dir = TempDir::new().unwrap();
        // The validator compares its two file arguments
        let cx = context(
            dir.path(),
            TestingMode::Validation,
            EngineConfig::default(),
            &[
                (SourceRole::Generator, "echo '1 2 3'\n"),
                (SourceRole::Candidate, "cat\n"),
                (
                    SourceRole::Validator,
                    "cmp -s \"$1\" \"$2\" && exit 0\nexit 1\n",
                ),
            ],
        );

        let verdict = run_test(cx, 0).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::Passed);
        assert!(verdict.timings.validator.is_some());
    }
}
