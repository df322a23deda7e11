//! Test utilities for srcgraph-toolchain

use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use srcgraph_core::{
    DependencyTarget, GraphOutput, RawDependency, RepoConfig, Resolution, ResolvedTarget, SourceUnit,
    UnitVariant,
};
use tempfile::TempDir;

use crate::context::Context;
use crate::dep::{Lister, Resolver};
use crate::error::Result;
use crate::grapher::Grapher;
use crate::registry::{Registry, RegistryBuilder};
use crate::runner::CommandRunner;
use crate::scan::Scanner;
use crate::toolchains;

/// Context with the bundled toolchains and a local sandbox.
pub fn test_context() -> Context {
    let mut builder = Registry::builder();
    toolchains::register_all(&mut builder);
    Context::new(Arc::new(builder.build()), CommandRunner::local())
}

/// Context over a registry wired by `wire`, with a local sandbox.
pub fn context_with(wire: impl FnOnce(&mut RegistryBuilder)) -> Context {
    let mut builder = Registry::builder();
    wire(&mut builder);
    Context::new(Arc::new(builder.build()), CommandRunner::local())
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

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestPackage {
    pub name: String,
}

impl TestPackage {
    pub fn new(name: &str) -> Self {
        TestPackage {
            name: name.to_string(),
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
        vec![PathBuf::from(&self.name).join("main.test")]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl UnitVariant for TestPackage {
    const VARIANT: &'static str = "TestPackage";
}

/// Dependency whose name scripts its resolution: `ok:<repo>` resolves to
/// `https://github.com/<repo>`, `none:*` is unresolved, `err:*` fails and
/// `nourl:*` resolves without a clone URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDep {
    pub name: String,
}

impl DependencyTarget for TestDep {
    const TARGET_TYPE: &'static str = "test-dep";
}

pub fn test_dep(name: &str) -> RawDependency {
    let mut dep = RawDependency::new(&TestDep {
        name: name.to_string(),
    })
    .unwrap();
    dep.from_unit = "app".to_string();
    dep.from_unit_type = TestPackage::VARIANT.to_string();
    dep
}

/// Resolves [`TestDep`]s as their names say, recording every call.
#[derive(Default, Clone)]
pub struct ScriptedResolver {
    pub calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, _ctx: &Context, dep: &RawDependency, _repo: &RepoConfig) -> Result<Resolution> {
        let name = dep.decode_target::<TestDep>()?.name;
        self.calls.lock().unwrap().push(name.clone());

        let (mode, rest) = name.split_once(':').unwrap_or((name.as_str(), ""));
        match mode {
            "ok" => Ok(Resolution::Resolved(ResolvedTarget {
                to_repo_clone_url: format!("https://github.com/{rest}.git"),
                to_unit: ".".to_string(),
                to_unit_type: TestPackage::VARIANT.to_string(),
                to_version_string: "1.0.0".to_string(),
                to_rev_spec: String::new(),
            })),
            "nourl" => Ok(Resolution::Resolved(ResolvedTarget {
                to_unit: ".".to_string(),
                to_unit_type: TestPackage::VARIANT.to_string(),
                ..Default::default()
            })),
            "none" => Ok(Resolution::Unresolved),
            _ => Err(anyhow::anyhow!("cannot resolve {name}").into()),
        }
    }
}

/// Scanner reporting a fixed set of packages.
pub struct FixedScanner(pub Vec<&'static str>);

#[async_trait]
impl Scanner for FixedScanner {
    async fn scan(&self, _ctx: &Context, _dir: &Path, _repo: &RepoConfig) -> Result<Vec<Arc<dyn SourceUnit>>> {
        Ok(self
            .0
            .iter()
            .map(|name| Arc::new(TestPackage::new(name)) as Arc<dyn SourceUnit>)
            .collect())
    }
}

/// Lister returning the same dependencies for every unit.
pub struct FixedLister(pub Vec<RawDependency>);

#[async_trait]
impl Lister for FixedLister {
    async fn list(
        &self,
        _ctx: &Context,
        _dir: &Path,
        _unit: &dyn SourceUnit,
        _repo: &RepoConfig,
    ) -> Result<Vec<RawDependency>> {
        Ok(self.0.clone())
    }
}

/// Grapher returning a fixed output.
pub struct FixedGrapher(pub GraphOutput);

#[async_trait]
impl Grapher for FixedGrapher {
    async fn graph(
        &self,
        _ctx: &Context,
        _dir: &Path,
        _unit: &dyn SourceUnit,
        _repo: &RepoConfig,
    ) -> Result<GraphOutput> {
        Ok(self.0.clone())
    }
}
