//! Per-language build and run strategies
//!
//! Each strategy knows how to turn one language's source file into a runnable
//! artifact and how to invoke that artifact. The compiler and runner only see
//! this trait, so adding a language means adding one implementation here.

use std::path::{Path, PathBuf};

use crate::languages::{CppToolchain, JavaToolchain, Language, PythonToolchain, ToolchainConfig};

/// What a build produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A native executable
    Executable,
    /// A bytecode unit launched through a runtime
    BytecodeUnit,
    /// The source file itself (interpreted languages)
    SourceItself,
}

/// Build/run strategy for one language
pub trait LanguageStrategy: Send + Sync {
    fn language(&self) -> Language;

    /// Whether the language has a build step at all
    fn needs_build(&self) -> bool;

    fn artifact_kind(&self) -> ArtifactKind;

    /// Where the build artifact for `source` lives
    fn artifact_path(&self, source: &Path) -> PathBuf;

    /// Full compiler invocation (program + args). Empty for interpreted
    /// languages.
    fn build_command(&self, source: &Path, artifact: &Path) -> Vec<String>;

    /// Full run invocation (program + args) for a built artifact
    fn run_command(&self, artifact: &Path, argv: &[String]) -> Vec<String>;
}

/// Look up the strategy for a language
pub fn strategy_for(language: Language, config: &ToolchainConfig) -> Box<dyn LanguageStrategy> {
    match language {
        Language::Cpp => Box::new(CppStrategy {
            toolchain: config.cpp.clone(),
        }),
        Language::Java => Box::new(JavaStrategy {
            toolchain: config.java.clone(),
        }),
        Language::Python => Box::new(PythonStrategy {
            toolchain: config.python.clone(),
        }),
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Source file stem, used to name executables and Java classes
fn source_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// C++: compile with g++ to a native executable next to the source
pub struct CppStrategy {
    toolchain: CppToolchain,
}

impl LanguageStrategy for CppStrategy {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn needs_build(&self) -> bool {
        true
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::Executable
    }

    fn artifact_path(&self, source: &Path) -> PathBuf {
        source.with_extension("")
    }

    fn build_command(&self, source: &Path, artifact: &Path) -> Vec<String> {
        let mut cmd = vec![
            self.toolchain.compiler.clone(),
            format!("-{}", self.toolchain.optimization),
            format!("-std={}", self.toolchain.std),
        ];
        cmd.extend(self.toolchain.flags.iter().cloned());
        cmd.push(path_str(source));
        cmd.push("-o".into());
        cmd.push(path_str(artifact));
        cmd
    }

    fn run_command(&self, artifact: &Path, argv: &[String]) -> Vec<String> {
        let mut cmd = vec![path_str(artifact)];
        cmd.extend(argv.iter().cloned());
        cmd
    }
}

/// Java: javac into the source's directory, run through the JVM with the
/// class named after the source file
pub struct JavaStrategy {
    toolchain: JavaToolchain,
}

impl LanguageStrategy for JavaStrategy {
    fn language(&self) -> Language {
        Language::Java
    }

    fn needs_build(&self) -> bool {
        true
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::BytecodeUnit
    }

    fn artifact_path(&self, source: &Path) -> PathBuf {
        source.with_extension("class")
    }

    fn build_command(&self, source: &Path, artifact: &Path) -> Vec<String> {
        let class_dir = artifact.parent().unwrap_or(Path::new("."));
        let mut cmd = vec![self.toolchain.compiler.clone()];
        cmd.extend(self.toolchain.flags.iter().cloned());
        cmd.push("-d".into());
        cmd.push(path_str(class_dir));
        cmd.push(path_str(source));
        cmd
    }

    fn run_command(&self, artifact: &Path, argv: &[String]) -> Vec<String> {
        let class_dir = artifact.parent().unwrap_or(Path::new("."));
        let mut cmd = vec![
            self.toolchain.runtime.clone(),
            "-cp".into(),
            path_str(class_dir),
            source_stem(artifact),
        ];
        cmd.extend(argv.iter().cloned());
        cmd
    }
}

/// Python: no build step, the interpreter runs the source directly
pub struct PythonStrategy {
    toolchain: PythonToolchain,
}

impl LanguageStrategy for PythonStrategy {
    fn language(&self) -> Language {
        Language::Python
    }

    fn needs_build(&self) -> bool {
        false
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::SourceItself
    }

    fn artifact_path(&self, source: &Path) -> PathBuf {
        source.to_path_buf()
    }

    fn build_command(&self, _source: &Path, _artifact: &Path) -> Vec<String> {
        vec![]
    }

    fn run_command(&self, artifact: &Path, argv: &[String]) -> Vec<String> {
        let mut cmd = vec![self.toolchain.interpreter.clone()];
        cmd.extend(self.toolchain.flags.iter().cloned());
        cmd.push(path_str(artifact));
        cmd.extend(argv.iter().cloned());
        cmd
    }
}
