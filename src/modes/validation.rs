//! Validation mode
//!
//! Invokes an external validator as `validator <input_file> <output_file>`
//! and maps its exit code onto a verdict. Both files are on disk so the
//! validator can open and re-read them freely.
//!
//! Exit code protocol: 0 correct, 1 wrong answer, 2 presentation error.
//! Anything else is a validator malfunction, reported as ValidatorError and
//! never as a candidate failure.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Judgement, ModeJudge, TestContext, TestingMode};
use crate::compiler::SourceRole;
use crate::executor::{self, ExecutionRequest, ExecutionResult};
use crate::verdict::{Diagnostic, Outcome};

/// Validators are trusted helpers; a stuck one is an infrastructure fault
const VALIDATOR_TIME_LIMIT: Duration = Duration::from_secs(10);

pub struct ValidationJudge;

/// Map a validator exit code onto an outcome
pub fn classify_validator_exit(exit_code: i32) -> Outcome {
    match exit_code {
        0 => Outcome::Passed,
        1 | 2 => Outcome::Failed,
        _ => Outcome::ValidatorError,
    }
}

#[async_trait]
impl ModeJudge for ValidationJudge {
    fn mode(&self) -> TestingMode {
        TestingMode::Validation
    }

    async fn judge(
        &self,
        cx: &TestContext<'_>,
        _candidate: &ExecutionResult,
    ) -> Option<Judgement> {
        if cx.cancelled() {
            return None;
        }

        let Some(validator) = cx.artifacts.get(&SourceRole::Validator) else {
            return Some(validator_error(-1, Some("no validator artifact".into())));
        };

        let argv = vec![
            cx.input_path.display().to_string(),
            cx.output_path.display().to_string(),
        ];
        let request = ExecutionRequest::new(validator.run_command(cx.toolchains, &argv))
            .with_time_limit(VALIDATOR_TIME_LIMIT);

        let result = match executor::execute(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Validator spawn failed for test {}: {}", cx.test_index, e);
                return Some(validator_error(-1, Some(e.to_string())));
            }
        };

        if result.timed_out {
            return Some(validator_error(
                result.exit_code,
                Some("validator timed out".into()),
            ));
        }

        let outcome = classify_validator_exit(result.exit_code);
        debug!(
            "Validator for test {}: exit_code={}, outcome={}",
            cx.test_index, result.exit_code, outcome
        );

        // Validator commentary lands on stdout or stderr depending on the
        // library used to write it
        let message = if !result.stdout.trim().is_empty() {
            Some(result.stdout.trim().to_string())
        } else if !result.stderr.trim().is_empty() {
            Some(result.stderr.trim().to_string())
        } else {
            None
        };

        let diagnostic = if outcome.is_pass() {
            None
        } else {
            Some(Diagnostic::ValidatorExit {
                exit_code: result.exit_code,
                message,
            })
        };

        Some(Judgement {
            outcome,
            diagnostic,
            reference_time: None,
            validator_time: Some(result.wall_time),
        })
    }
}

fn validator_error(exit_code: i32, message: Option<String>) -> Judgement {
    Judgement {
        outcome: Outcome::ValidatorError,
        diagnostic: Some(Diagnostic::ValidatorExit { exit_code, message }),
        reference_time: None,
        validator_time: None,
    }
}
