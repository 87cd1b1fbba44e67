//! arbiter - multi-language stress-testing engine
//!
//! Builds user-authored sources (generator, candidate, optional reference,
//! optional validator), runs them repeatedly against freshly generated
//! inputs under wall-clock and memory limits, and produces a structured
//! verdict per test across three modes: benchmark, comparison and
//! validation.

pub mod compiler;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod languages;
pub mod modes;
pub mod runner;
pub mod strategy;
pub mod verdict;
pub mod worker;
pub mod workspace;

pub use compiler::{BuildArtifact, Compiler, SourceFile, SourceRole};
pub use config::{ComparisonPolicy, EngineConfig};
pub use error::{BuildError, RunnerError, SpawnError};
pub use events::{EventSink, NullSink, TracingSink};
pub use executor::{ExecutionRequest, ExecutionResult};
pub use languages::{Language, ToolchainConfig};
pub use modes::TestingMode;
pub use runner::{RunState, Runner};
pub use verdict::{Outcome, RunSummary, TestVerdict};
pub use workspace::Workspace;
