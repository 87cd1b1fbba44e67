//! Benchmark mode
//!
//! Measures resource usage only. A candidate that exits cleanly within its
//! limits passes; output correctness is never checked.

use async_trait::async_trait;

use super::{Judgement, ModeJudge, TestContext, TestingMode};
use crate::executor::ExecutionResult;

pub struct BenchmarkJudge;

#[async_trait]
impl ModeJudge for BenchmarkJudge {
    fn mode(&self) -> TestingMode {
        TestingMode::Benchmark
    }

    async fn judge(
        &self,
        _cx: &TestContext<'_>,
        _candidate: &ExecutionResult,
    ) -> Option<Judgement> {
        // The worker already classified crashes, timeouts and memory kills;
        // anything reaching a judge ran cleanly.
        Some(Judgement::passed())
    }
}
