//! Run orchestration
//!
//! A `Runner` owns one run: it compiles every source, fans the requested
//! test count out across a bounded worker pool, aggregates verdicts behind a
//! single lock, and honors cooperative cancellation. Create a fresh runner
//! per run; a stopped runner stays stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::compiler::{BuildArtifact, Compiler, SourceFile, SourceRole};
use crate::config::EngineConfig;
use crate::error::RunnerError;
use crate::events::EventSink;
use crate::languages::ToolchainConfig;
use crate::modes::{judge_for, TestingMode};
use crate::verdict::{RunSummary, TestVerdict};
use crate::worker::{self, RunContext};
use crate::workspace::Workspace;

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Compiling,
    Running,
    Completed,
    Cancelled,
    CompileFailed,
}

pub struct Runner {
    mode: TestingMode,
    config: EngineConfig,
    toolchains: Arc<ToolchainConfig>,
    workspace: Workspace,
    compiler: Compiler,
    sink: Arc<dyn EventSink>,
    cancel: Arc<AtomicBool>,
    state: Mutex<RunState>,
}

impl Runner {
    pub fn new(
        mode: TestingMode,
        config: EngineConfig,
        toolchains: Arc<ToolchainConfig>,
        workspace: Workspace,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let compiler = Compiler::new(
            toolchains.clone(),
            config.compile_time_limit,
            config.compile_memory_limit_kb,
            config.build_workers,
        );
        Self {
            mode,
            config,
            toolchains,
            workspace,
            compiler,
            sink,
            cancel: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Request cooperative cancellation. Tests already past their last
    /// checkpoint still complete and report.
    pub fn stop(&self) {
        info!("Stop requested");
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Compile everything, then run `test_count` independent test cases.
    ///
    /// A build failure short-circuits to a zero-verdict summary carrying the
    /// compiler's stderr; execution never starts on a broken build.
    pub async fn run(
        &self,
        sources: Vec<SourceFile>,
        test_count: usize,
    ) -> Result<RunSummary, RunnerError> {
        for role in self.mode.required_roles() {
            if !sources.iter().any(|s| s.role == *role) {
                return Err(RunnerError::MissingRole {
                    role: role.to_string(),
                    mode: self.mode.to_string(),
                });
            }
        }

        self.set_state(RunState::Compiling);
        info!(
            "Compiling {} sources for {} mode",
            sources.len(),
            self.mode
        );

        let compile_results = self.compiler.compile_all(&sources).await;

        let mut artifacts = std::collections::BTreeMap::new();
        let mut build_errors: Vec<String> = Vec::new();
        for source in &sources {
            match compile_results.get(&source.role) {
                Some(Ok(artifact)) => {
                    artifacts.insert(source.role, artifact.clone());
                }
                Some(Err(e)) => build_errors.push(format!("{}: {}", source.role, e)),
                None => build_errors.push(format!("{}: build produced no result", source.role)),
            }
        }

        if !build_errors.is_empty() {
            warn!("Compilation failed, run aborted");
            self.set_state(RunState::CompileFailed);
            let summary = RunSummary {
                requested: test_count,
                verdicts: vec![],
                cancelled: false,
                overall_passed: false,
                build_failure: Some(build_errors.join("\n")),
            };
            self.sink.run_completed(&summary);
            return Ok(summary);
        }

        self.workspace.ensure_mode_dirs(self.mode)?;
        self.set_state(RunState::Running);
        info!(
            "Running {} tests on {} workers",
            test_count, self.config.test_workers
        );

        let summary = self.execute_tests(artifacts, test_count).await;

        self.set_state(if summary.cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        });
        self.sink.run_completed(&summary);
        Ok(summary)
    }

    async fn execute_tests(
        &self,
        artifacts: std::collections::BTreeMap<SourceRole, BuildArtifact>,
        test_count: usize,
    ) -> RunSummary {
        let run_cx = Arc::new(RunContext {
            mode: self.mode,
            config: self.config.clone(),
            toolchains: self.toolchains.clone(),
            workspace: self.workspace.clone(),
            artifacts,
            judge: judge_for(self.mode, &self.config),
            cancel: self.cancel.clone(),
        });

        // The only shared mutable state of the run; held just long enough to
        // append one verdict
        let collected: Arc<Mutex<Vec<TestVerdict>>> = Arc::new(Mutex::new(Vec::new()));
        let semaphore = Arc::new(Semaphore::new(self.config.test_workers.max(1)));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for test_index in 0..test_count {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }

            let run_cx = run_cx.clone();
            let collected = collected.clone();
            let semaphore = semaphore.clone();
            let sink = self.sink.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if run_cx.cancel.load(Ordering::Relaxed) {
                    return;
                }

                sink.test_started(test_index, test_count);

                if let Some(verdict) = worker::run_test(run_cx, test_index).await {
                    collected
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(verdict.clone());
                    sink.test_completed(&verdict);
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Test task aborted: {}", e);
            }
        }

        let cancelled = self.cancel.load(Ordering::Relaxed);
        let verdicts: Vec<TestVerdict> = collected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let overall_passed = !cancelled && verdicts.iter().all(|v| v.outcome.is_pass());

        RunSummary {
            requested: test_count,
            verdicts,
            cancelled,
            overall_passed,
            build_failure: None,
        }
    }
}
