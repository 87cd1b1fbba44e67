//! Engine configuration
//!
//! Limits and pool sizes, loaded from environment variables with sane
//! defaults. Toolchain settings live in `languages.toml` (see
//! [`crate::languages::ToolchainConfig`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How candidate and reference outputs are compared in comparison mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonPolicy {
    /// Whitespace-insensitive token comparison; mismatches carry the
    /// 1-based token position
    Tokens,
    /// Line-by-line comparison ignoring trailing whitespace and trailing
    /// blank lines
    Exact,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock limit for one candidate run
    pub time_limit: Duration,
    /// Peak-RSS limit for one candidate run (None disables the check)
    pub memory_limit_kb: Option<u64>,
    /// Wall-clock limit for one generator run
    pub generator_time_limit: Duration,
    /// Wall-clock limit for one compiler invocation
    pub compile_time_limit: Duration,
    /// Peak-RSS limit for one compiler invocation
    pub compile_memory_limit_kb: Option<u64>,
    /// Test-case worker pool size
    pub test_workers: usize,
    /// Build worker pool size
    pub build_workers: usize,
    /// Output comparison policy (comparison mode)
    pub comparison: ComparisonPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_millis(1000),
            memory_limit_kb: Some(256 * 1024),
            generator_time_limit: Duration::from_secs(10),
            compile_time_limit: Duration::from_secs(30),
            compile_memory_limit_kb: Some(2048 * 1024),
            test_workers: default_test_workers(),
            build_workers: default_build_workers(),
            comparison: ComparisonPolicy::Tokens,
        }
    }
}

impl EngineConfig {
    /// Build a config from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_u64("ARBITER_TIME_LIMIT_MS") {
            config.time_limit = Duration::from_millis(ms);
        }
        if let Some(mb) = env_u64("ARBITER_MEMORY_LIMIT_MB") {
            config.memory_limit_kb = if mb == 0 { None } else { Some(mb * 1024) };
        }
        if let Some(n) = env_u64("ARBITER_TEST_WORKERS") {
            config.test_workers = (n as usize).max(1);
        }
        if let Some(n) = env_u64("ARBITER_BUILD_WORKERS") {
            config.build_workers = (n as usize).max(1);
        }
        if let Ok(policy) = std::env::var("ARBITER_COMPARISON") {
            match policy.as_str() {
                "tokens" => config.comparison = ComparisonPolicy::Tokens,
                "exact" => config.comparison = ComparisonPolicy::Exact,
                other => warn!("Unknown comparison policy '{}', using default", other),
            }
        }

        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}={}", key, raw);
            None
        }
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Default test pool: CPU count - 1, at least 1, at most 8
fn default_test_workers() -> usize {
    available_cpus().saturating_sub(1).clamp(1, 8)
}

/// Default build pool: at most 4, to avoid oversubscribing the toolchain
fn default_build_workers() -> usize {
    available_cpus().clamp(1, 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.time_limit, Duration::from_millis(1000));
        assert_eq!(config.memory_limit_kb, Some(256 * 1024));
        assert!(config.test_workers >= 1 && config.test_workers <= 8);
        assert!(config.build_workers >= 1 && config.build_workers <= 4);
        assert_eq!(config.comparison, ComparisonPolicy::Tokens);
    }
}
