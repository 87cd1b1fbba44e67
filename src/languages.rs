//! Language identification and toolchain configuration
//!
//! Languages are detected from the source file extension. Toolchain settings
//! (compiler paths, flags, interpreter) are loaded from a TOML file; every
//! field has a built-in default so a partial file is fine.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// A supported programming language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Cpp,
    Java,
    Python,
}

/// How a language's sources become runnable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageKind {
    /// Compiled to a native executable (C++)
    NativeCompiled,
    /// Compiled to bytecode run by a separate runtime (Java)
    BytecodeCompiled,
    /// Run directly by an interpreter (Python)
    Interpreted,
}

impl Language {
    /// Detect a language from a source file's extension
    pub fn from_extension(path: &Path) -> Option<Language> {
        match path.extension()?.to_str()? {
            "cpp" | "cc" | "cxx" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "py" => Some(Language::Python),
            _ => None,
        }
    }

    pub fn kind(&self) -> LanguageKind {
        match self {
            Language::Cpp => LanguageKind::NativeCompiled,
            Language::Java => LanguageKind::BytecodeCompiled,
            Language::Python => LanguageKind::Interpreted,
        }
    }

    /// Canonical source file extension for this language
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "py",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
        };
        write!(f, "{}", s)
    }
}

/// C++ toolchain settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CppToolchain {
    /// Compiler executable (e.g. "g++")
    pub compiler: String,
    /// Language standard passed as -std=<std>
    pub std: String,
    /// Optimization level passed as -<optimization>
    pub optimization: String,
    /// Extra flags inserted before the source path
    pub flags: Vec<String>,
}

impl Default for CppToolchain {
    fn default() -> Self {
        Self {
            compiler: "g++".into(),
            std: "c++17".into(),
            optimization: "O2".into(),
            flags: vec!["-Wall".into(), "-pipe".into()],
        }
    }
}

/// Java toolchain settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JavaToolchain {
    /// Compiler executable (e.g. "javac")
    pub compiler: String,
    /// Runtime executable (e.g. "java")
    pub runtime: String,
    /// Extra compiler flags
    pub flags: Vec<String>,
}

impl Default for JavaToolchain {
    fn default() -> Self {
        Self {
            compiler: "javac".into(),
            runtime: "java".into(),
            flags: vec![],
        }
    }
}

/// Python toolchain settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PythonToolchain {
    /// Interpreter executable (e.g. "python3")
    pub interpreter: String,
    /// Interpreter flags inserted before the script path
    pub flags: Vec<String>,
}

impl Default for PythonToolchain {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            flags: vec!["-u".into()],
        }
    }
}

/// Toolchain settings for all supported languages
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub cpp: CppToolchain,
    pub java: JavaToolchain,
    pub python: PythonToolchain,
}

impl ToolchainConfig {
    /// Load toolchain settings from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read toolchain config {}", path.display()))?;
        let config: ToolchainConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid toolchain config {}", path.display()))?;
        Ok(config)
    }
}
