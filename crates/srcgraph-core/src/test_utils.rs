//! Test utilities for srcgraph-core

use std::any::Any;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::unit::{SourceUnit, UnitVariant};

/// Minimal package-like unit for registry tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestPackage {
    pub name: String,
    pub files: Vec<PathBuf>,
}

impl TestPackage {
    pub fn new(name: &str) -> Self {
        TestPackage {
            name: name.to_string(),
            files: vec![PathBuf::from(name).join("index.js")],
        }
    }
}

impl SourceUnit for TestPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn root_dir(&self) -> PathBuf {
        PathBuf::from(&self.name)
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.files.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl UnitVariant for TestPackage {
    const VARIANT: &'static str = "TestPackage";
}

/// Second variant, so same-name units of different variants can be tested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestModule {
    pub name: String,
}

impl TestModule {
    pub fn new(name: &str) -> Self {
        TestModule {
            name: name.to_string(),
        }
    }
}

impl SourceUnit for TestModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn root_dir(&self) -> PathBuf {
        PathBuf::from(".")
    }

    fn paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl UnitVariant for TestModule {
    const VARIANT: &'static str = "TestModule";
}

/// Create a temporary repository holding an npm package and a Python project
pub fn create_test_repo() -> TempDir {
    create_repo_with_structure(&[
        (
            "package.json",
            r#"{
  "name": "test-project",
  "version": "0.1.0",
  "dependencies": { "left-pad": "^1.3.0" }
}
"#,
        ),
        ("lib/index.js", "module.exports = require('left-pad');\n"),
        (
            "srcgraph.toml",
            r#"uri = "github.com/example/test-project"
clone_url = "https://github.com/example/test-project.git"

[toolchains.npm]
registry = "https://registry.npmjs.org/"
"#,
        ),
        ("setup.py", "from setuptools import setup\nsetup(name='test-project')\n"),
    ])
}

/// Create a repository with a specific file structure
pub fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for (path, content) in structure {
        let full_path = root.join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }

        fs::write(&full_path, content).unwrap();
    }

    temp_dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_repo() {
        let temp_dir = create_test_repo();
        let root = temp_dir.path();

        assert!(root.join("package.json").exists());
        assert!(root.join("lib/index.js").exists());
        assert!(root.join("srcgraph.toml").exists());
    }
}
