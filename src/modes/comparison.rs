//! Comparison mode
//!
//! Runs the trusted reference solution on the same input and compares its
//! output with the candidate's under the configured policy.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Judgement, ModeJudge, TestContext, TestingMode};
use crate::compiler::SourceRole;
use crate::config::ComparisonPolicy;
use crate::executor::{self, ExecutionRequest, ExecutionResult, StdinSource};
use crate::verdict::{Diagnostic, Outcome};

/// Slack factor applied to the candidate's time limit for the reference
/// solution; it is trusted, not raced.
const REFERENCE_TIME_FACTOR: u32 = 10;

pub struct ComparisonJudge {
    policy: ComparisonPolicy,
}

impl ComparisonJudge {
    pub fn new(policy: ComparisonPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl ModeJudge for ComparisonJudge {
    fn mode(&self) -> TestingMode {
        TestingMode::Comparison
    }

    async fn judge(
        &self,
        cx: &TestContext<'_>,
        candidate: &ExecutionResult,
    ) -> Option<Judgement> {
        if cx.cancelled() {
            return None;
        }

        let Some(reference) = cx.artifacts.get(&SourceRole::Reference) else {
            return Some(stage_failure("reference", "no reference artifact".into()));
        };

        let request = ExecutionRequest::new(reference.run_command(cx.toolchains, &[]))
            .with_stdin(StdinSource::File(cx.input_path.to_path_buf()))
            .with_time_limit(cx.config.time_limit * REFERENCE_TIME_FACTOR);

        let result = match executor::execute(&request).await {
            Ok(result) => result,
            Err(e) => {
                return Some(stage_failure("reference", e.to_string()));
            }
        };

        if !result.is_success() {
            let message = if result.timed_out {
                "reference solution timed out".to_string()
            } else if !result.stderr.is_empty() {
                result.stderr.clone()
            } else {
                format!("reference solution exited with code {}", result.exit_code)
            };
            return Some(stage_failure("reference", message));
        }

        if let Err(e) = tokio::fs::write(cx.reference_output_path, &result.stdout).await {
            warn!(
                "Failed to save reference output for test {}: {}",
                cx.test_index, e
            );
        }

        let diagnostic = match self.policy {
            ComparisonPolicy::Tokens => {
                compare_tokens(&result.stdout, &candidate.stdout).map(
                    |(position, expected, actual)| Diagnostic::TokenMismatch {
                        position,
                        expected,
                        actual,
                    },
                )
            }
            ComparisonPolicy::Exact => {
                if lines_match(&result.stdout, &candidate.stdout) {
                    None
                } else {
                    Some(Diagnostic::OutputMismatch {
                        expected: result.stdout.clone(),
                        actual: candidate.stdout.clone(),
                    })
                }
            }
        };

        let outcome = if diagnostic.is_none() {
            Outcome::Passed
        } else {
            debug!("Test {}: output mismatch", cx.test_index);
            Outcome::Failed
        };

        Some(Judgement {
            outcome,
            diagnostic,
            reference_time: Some(result.wall_time),
            validator_time: None,
        })
    }
}

fn stage_failure(stage: &str, message: String) -> Judgement {
    Judgement {
        outcome: Outcome::RuntimeError,
        diagnostic: Some(Diagnostic::StageFailure {
            stage: stage.to_string(),
            message,
        }),
        reference_time: None,
        validator_time: None,
    }
}

/// Whitespace-insensitive token comparison. Returns the 1-based position of
/// the first differing token, with the tokens themselves (None past the end
/// of the shorter output).
pub fn compare_tokens(
    expected: &str,
    actual: &str,
) -> Option<(usize, Option<String>, Option<String>)> {
    let mut expected_tokens = expected.split_whitespace();
    let mut actual_tokens = actual.split_whitespace();
    let mut position = 0;

    loop {
        position += 1;
        match (expected_tokens.next(), actual_tokens.next()) {
            (None, None) => return None,
            (e, a) if e == a => {}
            (e, a) => {
                return Some((position, e.map(String::from), a.map(String::from)));
            }
        }
    }
}

/// Line-by-line comparison ignoring trailing whitespace and trailing blank
/// lines
pub fn lines_match(expected: &str, actual: &str) -> bool {
    let normalize = |s: &str| -> Vec<String> {
        let mut lines: Vec<String> = s.lines().map(|line| line.trim_end().to_string()).collect();
        while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
            lines.pop();
        }
        lines
    };

    normalize(expected) == normalize(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_tokens_equal() {
        assert_eq!(compare_tokens("1 2 3", "1 2 3"), None);
        assert_eq!(compare_tokens("1 2 3\n", "1  2\n3"), None);
        assert_eq!(compare_tokens("", "  \n "), None);
    }

    #[test]
    fn test_compare_tokens_mismatch_position() {
        let (position, expected, actual) = compare_tokens("1 2 3 4 5", "1 2 3 4 6").unwrap();
        assert_eq!(position, 5);
        assert_eq!(expected.as_deref(), Some("5"));
        assert_eq!(actual.as_deref(), Some("6"));
    }

    #[test]
    fn test_compare_tokens_length_mismatch() {
        let (position, expected, actual) = compare_tokens("1 2 3", "1 2").unwrap();
        assert_eq!(position, 3);
        assert_eq!(expected.as_deref(), Some("3"));
        assert_eq!(actual, None);

        let (position, expected, actual) = compare_tokens("1", "1 2").unwrap();
        assert_eq!(position, 2);
        assert_eq!(expected, None);
        assert_eq!(actual.as_deref(), Some("2"));
    }

    #[test]
    fn test_lines_match_normalizes_trailing_whitespace() {
        assert!(lines_match("hello  \nworld\n", "hello\nworld"));
        assert!(lines_match("hello\nworld\n\n\n", "hello\nworld\n"));
        assert!(!lines_match("hello\nworld", "hello\nearth"));
        assert!(!lines_match("hello world", "hello  world"));
    }
}
