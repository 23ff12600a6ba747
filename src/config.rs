//! Suite discovery and loading.

use crate::model::TestSuite;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Finds and parses YAML suite files.
#[derive(Debug)]
pub struct SuiteLoader {
    pub suite_paths: Vec<PathBuf>,
}

impl SuiteLoader {
    pub fn new() -> Self {
        Self {
            suite_paths: vec![PathBuf::from("tests/suites")],
        }
    }

    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.suite_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Load a single suite file.
    pub fn load_suite<P: AsRef<Path>>(&self, path: P) -> Result<TestSuite> {
        let path = path.as_ref();
        info!("Loading test suite from {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite file: {}", path.display()))?;
        let suite = TestSuite::from_yaml(&content)
            .with_context(|| format!("Failed to parse YAML from {}", path.display()))?;

        debug!("Loaded suite '{}' with {} test(s)", suite.name, suite.tests.len());
        Ok(suite)
    }

    /// Load every suite file directly inside `dir`, sorted by file name.
    /// Files that fail to parse are skipped with a warning.
    pub fn load_suites_from_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<TestSuite>> {
        let dir = dir.as_ref();
        info!("Loading test suites from directory: {}", dir.display());

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_suite_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut suites = Vec::new();
        for path in paths {
            match self.load_suite(&path) {
                Ok(suite) => suites.push(suite),
                Err(err) => warn!("Skipping {}: {:#}", path.display(), err),
            }
        }

        info!("Loaded {} test suite(s) from {}", suites.len(), dir.display());
        Ok(suites)
    }

    /// Load a file, or every suite in a directory.
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> Result<Vec<TestSuite>> {
        let path = path.as_ref();
        if path.is_dir() {
            self.load_suites_from_dir(path)
        } else {
            Ok(vec![self.load_suite(path)?])
        }
    }

    /// Load suites from every configured directory that exists.
    pub fn load_all_suites(&self) -> Result<Vec<TestSuite>> {
        let mut all = Vec::new();
        for path in self.suite_paths.iter().filter(|p| p.is_dir()) {
            all.extend(self.load_suites_from_dir(path)?);
        }
        info!("Loaded {} test suite(s) in total", all.len());
        Ok(all)
    }
}

impl Default for SuiteLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_suite_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}
