//! Source roles, build artifacts and the staleness-checked compiler
//!
//! `compile_all` builds every stale compiled source on a small bounded pool
//! and skips everything whose artifact is still fresh. Freshness is exact
//! mtime equality between the source now and the source when the artifact
//! was built; an artifact recorded against a *newer* source mtime (clock
//! skew) is rebuilt, never trusted.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{BuildError, RunnerError};
use crate::executor::{self, ExecutionRequest};
use crate::languages::{Language, ToolchainConfig};
use crate::strategy::{strategy_for, ArtifactKind};

/// Role a source file plays in a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    Generator,
    Candidate,
    Reference,
    Validator,
}

impl std::fmt::Display for SourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceRole::Generator => "generator",
            SourceRole::Candidate => "candidate",
            SourceRole::Reference => "reference",
            SourceRole::Validator => "validator",
        };
        write!(f, "{}", s)
    }
}

/// One user-authored source file, immutable for the duration of a run
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub role: SourceRole,
    pub language: Language,
    pub path: PathBuf,
}

impl SourceFile {
    /// Create a source file, detecting the language from the extension
    pub fn new(role: SourceRole, path: impl Into<PathBuf>) -> Result<Self, RunnerError> {
        let path = path.into();
        let language =
            Language::from_extension(&path).ok_or_else(|| RunnerError::UnknownLanguage {
                path: path.display().to_string(),
            })?;
        Ok(Self {
            role,
            language,
            path,
        })
    }
}

/// A built (or pass-through) artifact for one role
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    pub role: SourceRole,
    pub language: Language,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Source mtime at the moment the artifact was produced
    pub source_mtime: SystemTime,
}

impl BuildArtifact {
    /// Full run invocation (program + args) for this artifact
    pub fn run_command(&self, toolchains: &ToolchainConfig, argv: &[String]) -> Vec<String> {
        strategy_for(self.language, toolchains).run_command(&self.path, argv)
    }
}

/// Per-role build results
pub type CompileResults = BTreeMap<SourceRole, Result<BuildArtifact, BuildError>>;

/// Builds stale sources in parallel and caches artifacts across calls
pub struct Compiler {
    toolchains: Arc<ToolchainConfig>,
    compile_time_limit: Duration,
    compile_memory_limit_kb: Option<u64>,
    workers: usize,
    cache: Mutex<HashMap<SourceRole, BuildArtifact>>,
}

impl Compiler {
    pub fn new(
        toolchains: Arc<ToolchainConfig>,
        compile_time_limit: Duration,
        compile_memory_limit_kb: Option<u64>,
        workers: usize,
    ) -> Self {
        Self {
            toolchains,
            compile_time_limit,
            compile_memory_limit_kb,
            workers: workers.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build every source that needs it. One failed build does not cancel
    /// the others; the caller decides whether the aggregate is usable.
    pub async fn compile_all(&self, sources: &[SourceFile]) -> CompileResults {
        let mut results = CompileResults::new();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut builds: JoinSet<(SourceRole, Result<BuildArtifact, BuildError>)> = JoinSet::new();

        for source in sources {
            let strategy = strategy_for(source.language, &self.toolchains);

            let current_mtime = match source_mtime(source) {
                Ok(mtime) => mtime,
                Err(e) => {
                    results.insert(source.role, Err(e));
                    continue;
                }
            };

            if !strategy.needs_build() {
                // Interpreted source: the artifact is the file itself
                results.insert(
                    source.role,
                    Ok(BuildArtifact {
                        role: source.role,
                        language: source.language,
                        kind: ArtifactKind::SourceItself,
                        path: strategy.artifact_path(&source.path),
                        source_mtime: current_mtime,
                    }),
                );
                continue;
            }

            if let Some(cached) = self.cached(source.role) {
                if cached.path.exists() && cached.source_mtime == current_mtime {
                    debug!(
                        "{} is up-to-date, skipping compilation",
                        cached.path.display()
                    );
                    results.insert(source.role, Ok(cached));
                    continue;
                }
            }

            let toolchains = self.toolchains.clone();
            let semaphore = semaphore.clone();
            let source = source.clone();
            let time_limit = self.compile_time_limit;
            let memory_limit = self.compile_memory_limit_kb;

            builds.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            source.role,
                            Err(BuildError::Io {
                                path: source.path.display().to_string(),
                                message: "build pool closed".into(),
                            }),
                        );
                    }
                };
                let result =
                    build_source(&toolchains, &source, current_mtime, time_limit, memory_limit)
                        .await;
                (source.role, result)
            });
        }

        while let Some(joined) = builds.join_next().await {
            match joined {
                Ok((role, result)) => {
                    match &result {
                        Ok(artifact) => {
                            info!("Compiled {}: {}", role, artifact.path.display());
                            self.cache
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .insert(role, artifact.clone());
                        }
                        Err(e) => warn!("Build failed for {}: {}", role, e),
                    }
                    results.insert(role, result);
                }
                Err(e) => warn!("Build task aborted: {}", e),
            }
        }

        results
    }

    fn cached(&self, role: SourceRole) -> Option<BuildArtifact> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&role)
            .cloned()
    }
}

fn source_mtime(source: &SourceFile) -> Result<SystemTime, BuildError> {
    std::fs::metadata(&source.path)
        .and_then(|m| m.modified())
        .map_err(|e| BuildError::Io {
            path: source.path.display().to_string(),
            message: e.to_string(),
        })
}

/// Run one compiler invocation under generous build limits
async fn build_source(
    toolchains: &ToolchainConfig,
    source: &SourceFile,
    source_mtime: SystemTime,
    time_limit: Duration,
    memory_limit_kb: Option<u64>,
) -> Result<BuildArtifact, BuildError> {
    let strategy = strategy_for(source.language, toolchains);
    let artifact_path = strategy.artifact_path(&source.path);
    let command = strategy.build_command(&source.path, &artifact_path);

    debug!("Compiling {} with {:?}", source.role, command);

    let request = ExecutionRequest::new(command)
        .with_time_limit(time_limit)
        .with_memory_limit_kb(memory_limit_kb);

    let result = executor::execute(&request)
        .await
        .map_err(|e| BuildError::CompilerMissing {
            program: e.program,
            message: e.message,
        })?;

    if result.timed_out {
        return Err(BuildError::TimedOut {
            seconds: time_limit.as_secs(),
        });
    }

    if !result.is_success() {
        // Compilers write diagnostics to stderr; fall back to stdout
        let stderr = if !result.stderr.is_empty() {
            result.stderr
        } else if !result.stdout.is_empty() {
            result.stdout
        } else {
            format!("compiler exited with code {}", result.exit_code)
        };
        return Err(BuildError::Failed { stderr });
    }

    Ok(BuildArtifact {
        role: source.role,
        language: source.language,
        kind: strategy.artifact_kind(),
        path: artifact_path,
        source_mtime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write an executable shell script standing in for a compiler.
    ///
    /// The generated C++ build command ends with `<src> -o <out>`, so the
    /// script drops everything else, copies the source to the output and
    /// records the invocation in a log.
    fn write_fake_cc(dir: &Path, log: &Path) -> PathBuf {
        let path = dir.join("fakecc");
        let script = format!(
            "#!/bin/sh\nwhile [ \"$#\" -gt 3 ]; do shift; done\necho \"$1\" >> {}\ncp \"$1\" \"$3\"\n",
            log.display()
        );
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn fake_toolchains(compiler: &Path) -> Arc<ToolchainConfig> {
        let mut config = ToolchainConfig::default();
        config.cpp.compiler = compiler.display().to_string();
        config.cpp.flags = vec![];
        Arc::new(config)
    }

    fn compiler(toolchains: Arc<ToolchainConfig>) -> Compiler {
        Compiler::new(toolchains, Duration::from_secs(10), None, 2)
    }

    fn cpp_source(dir: &Path, role: SourceRole, name: &str) -> SourceFile {
        let path = dir.join(name);
        std::fs::write(&path, "int main() { return 0; }\n").unwrap();
        SourceFile::new(role, path).unwrap()
    }

    fn invocations(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_interpreted_source_passes_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("generator.py");
        std::fs::write(&path, "print(1)\n").unwrap();
        let source = SourceFile::new(SourceRole::Generator, &path).unwrap();

        let c = compiler(Arc::new(ToolchainConfig::default()));
        let results = c.compile_all(&[source]).await;

        let artifact = results[&SourceRole::Generator].as_ref().unwrap();
        assert_eq!(artifact.kind, ArtifactKind::SourceItself);
        assert_eq!(artifact.path, path);
    }

    #[tokio::test]
    async fn test_compile_and_cache_hit() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("build.log");
        let cc = write_fake_cc(dir.path(), &log);
        let c = compiler(fake_toolchains(&cc));

        let source = cpp_source(dir.path(), SourceRole::Candidate, "candidate.cpp");

        let results = c.compile_all(std::slice::from_ref(&source)).await;
        let artifact = results[&SourceRole::Candidate].as_ref().unwrap();
        assert_eq!(artifact.kind, ArtifactKind::Executable);
        assert!(artifact.path.exists());
        assert_eq!(invocations(&log).len(), 1);

        let artifact_mtime_before = std::fs::metadata(&artifact.path).unwrap().modified().unwrap();

        // Unchanged source: second call performs zero rebuilds
        let results = c.compile_all(&[source]).await;
        assert!(results[&SourceRole::Candidate].is_ok());
        assert_eq!(invocations(&log).len(), 1);

        let artifact_mtime_after = std::fs::metadata(
            &results[&SourceRole::Candidate].as_ref().unwrap().path,
        )
        .unwrap()
        .modified()
        .unwrap();
        assert_eq!(artifact_mtime_before, artifact_mtime_after);
    }

    #[tokio::test]
    async fn test_touching_one_source_rebuilds_only_that_role() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("build.log");
        let cc = write_fake_cc(dir.path(), &log);
        let c = compiler(fake_toolchains(&cc));

        let generator = cpp_source(dir.path(), SourceRole::Generator, "generator.cpp");
        let candidate = cpp_source(dir.path(), SourceRole::Candidate, "candidate.cpp");
        let sources = vec![generator.clone(), candidate];

        let results = c.compile_all(&sources).await;
        assert!(results.values().all(|r| r.is_ok()));
        assert_eq!(invocations(&log).len(), 2);

        // Bump only the generator's mtime
        let file = std::fs::OpenOptions::new()
            .append(true)
            .open(&generator.path)
            .unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        let results = c.compile_all(&sources).await;
        assert!(results.values().all(|r| r.is_ok()));

        let log_lines = invocations(&log);
        assert_eq!(log_lines.len(), 3);
        assert!(log_lines[2].contains("generator.cpp"));
    }

    #[tokio::test]
    async fn test_failed_build_surfaces_stderr() {
        let dir = TempDir::new().unwrap();
        let cc = dir.path().join("badcc");
        std::fs::write(&cc, "#!/bin/sh\necho 'candidate.cpp:1: error' >&2\nexit 1\n").unwrap();
        let mut perms = std::fs::metadata(&cc).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&cc, perms).unwrap();

        let c = compiler(fake_toolchains(&cc));
        let source = cpp_source(dir.path(), SourceRole::Candidate, "candidate.cpp");

        let results = c.compile_all(&[source]).await;
        match &results[&SourceRole::Candidate] {
            Err(BuildError::Failed { stderr }) => assert!(stderr.contains("error")),
            other => panic!("expected Failed, got {:?}", other.as_ref().err()),
        }
    }

    #[tokio::test]
    async fn test_missing_compiler_is_reported() {
        let dir = TempDir::new().unwrap();
        let c = compiler(fake_toolchains(Path::new("/nonexistent/fakecc")));
        let source = cpp_source(dir.path(), SourceRole::Candidate, "candidate.cpp");

        let results = c.compile_all(&[source]).await;
        assert!(matches!(
            results[&SourceRole::Candidate],
            Err(BuildError::CompilerMissing { .. })
        ));
    }

    #[test]
    fn test_unknown_language_rejected() {
        assert!(SourceFile::new(SourceRole::Candidate, "notes.txt").is_err());
    }
}
