//! Engine error taxonomy
//!
//! Build failures are fatal to a run; spawn failures are fatal to a single
//! test. Timeouts, memory kills and non-zero exits are verdicts, not errors,
//! and never appear here.

use thiserror::Error;

/// A subprocess could not be started at all
#[derive(Debug, Error)]
#[error("failed to spawn '{program}': {message}")]
pub struct SpawnError {
    /// Program that could not be started
    pub program: String,
    /// Underlying OS error text
    pub message: String,
}

/// A source failed to build
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// The compiler itself could not be started
    #[error("compiler '{program}' could not be started: {message}")]
    CompilerMissing { program: String, message: String },

    /// The compiler reported diagnostics; stderr is surfaced verbatim
    #[error("compilation failed:\n{stderr}")]
    Failed { stderr: String },

    /// The compiler exceeded the build time limit
    #[error("compilation timed out after {seconds}s")]
    TimedOut { seconds: u64 },

    /// Filesystem error while preparing or checking the build
    #[error("build I/O error for {path}: {message}")]
    Io { path: String, message: String },
}

/// Errors raised by the runner before any test executes
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("missing required source role '{role}' for {mode} mode")]
    MissingRole { role: String, mode: String },

    #[error("unsupported source file '{path}': unknown language")]
    UnknownLanguage { path: String },

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}
