//! Workspace directory layout
//!
//! Each test mode owns a subdirectory of the workspace root. Sources live at
//! the top of the mode directory under role-derived names; generated test
//! I/O goes to `inputs/` and `outputs/`, uniquely named per test index so
//! concurrent tests never share a write target.

use std::io;
use std::path::{Path, PathBuf};

use crate::compiler::SourceRole;
use crate::languages::Language;
use crate::modes::TestingMode;

/// Paths inside one workspace root
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by one test mode
    pub fn mode_dir(&self, mode: TestingMode) -> PathBuf {
        self.root.join(mode.dir_name())
    }

    /// Create the mode directory and its `inputs`/`outputs` subdirectories
    pub fn ensure_mode_dirs(&self, mode: TestingMode) -> io::Result<()> {
        std::fs::create_dir_all(self.inputs_dir(mode))?;
        std::fs::create_dir_all(self.outputs_dir(mode))?;
        Ok(())
    }

    pub fn inputs_dir(&self, mode: TestingMode) -> PathBuf {
        self.mode_dir(mode).join("inputs")
    }

    pub fn outputs_dir(&self, mode: TestingMode) -> PathBuf {
        self.mode_dir(mode).join("outputs")
    }

    /// Generated input for one test
    pub fn input_path(&self, mode: TestingMode, test_index: usize) -> PathBuf {
        self.inputs_dir(mode)
            .join(format!("input_{}.txt", test_index))
    }

    /// Candidate output for one test
    pub fn output_path(&self, mode: TestingMode, test_index: usize) -> PathBuf {
        self.outputs_dir(mode)
            .join(format!("output_{}.txt", test_index))
    }

    /// Reference output for one test (comparison mode)
    pub fn reference_output_path(&self, mode: TestingMode, test_index: usize) -> PathBuf {
        self.outputs_dir(mode)
            .join(format!("reference_output_{}.txt", test_index))
    }

    /// Canonical source location for a role in a mode directory
    pub fn source_path(&self, mode: TestingMode, role: SourceRole, language: Language) -> PathBuf {
        self.mode_dir(mode)
            .join(format!("{}.{}", role, language.extension()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let ws = Workspace::new("/ws");

        assert_eq!(
            ws.input_path(TestingMode::Comparison, 3),
            PathBuf::from("/ws/comparator/inputs/input_3.txt")
        );
        assert_eq!(
            ws.output_path(TestingMode::Validation, 0),
            PathBuf::from("/ws/validator/outputs/output_0.txt")
        );
        assert_eq!(
            ws.reference_output_path(TestingMode::Comparison, 7),
            PathBuf::from("/ws/comparator/outputs/reference_output_7.txt")
        );
        assert_eq!(
            ws.source_path(TestingMode::Benchmark, SourceRole::Generator, Language::Cpp),
            PathBuf::from("/ws/benchmarker/generator.cpp")
        );
    }

    #[test]
    fn test_ensure_mode_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_mode_dirs(TestingMode::Benchmark).unwrap();
        assert!(ws.inputs_dir(TestingMode::Benchmark).is_dir());
        assert!(ws.outputs_dir(TestingMode::Benchmark).is_dir());
    }
}
