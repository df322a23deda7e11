//! Python toolchain
//!
//! Python projects are treated as one unit covering the whole repository.
//! Requirements come from `pydep`, which reports the source repository of
//! each requirement when it can find one.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use srcgraph_core::{
    DependencyTarget, RawDependency, RepoConfig, Resolution, ResolvedTarget, SourceUnit, UnitVariant,
};

use crate::command::Command;
use crate::context::Context;
use crate::dep::{ListCommand, Resolver, SandboxedLister};
use crate::error::Result;
use crate::registry::RegistryBuilder;
use crate::scan::Scanner;

/// Scanner name.
pub const PYTHON: &str = "python";

const SRC_ROOT: &str = "/srcgraph/src";
const PROJECT_MARKERS: [&str; 3] = ["setup.py", "pyproject.toml", "requirements.txt"];

/// The whole repository as a single Python unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PythonPackage {}

impl SourceUnit for PythonPackage {
    fn name(&self) -> &str {
        "."
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

impl UnitVariant for PythonPackage {
    const VARIANT: &'static str = "PythonPackage";
}

/// A requirement as reported by `pydep`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirement {
    pub project_name: String,
    pub unsafe_name: String,
    pub key: String,
    /// `(operator, version)` pairs, e.g. `("==", "1.0")`.
    pub specs: Vec<(String, String)>,
    pub extras: Vec<String>,
    pub repo_url: String,
    pub packages: Vec<String>,
    pub modules: Vec<String>,
}

impl DependencyTarget for Requirement {
    const TARGET_TYPE: &'static str = "python-requirement";
}

/// `[toolchains.python]` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Interpreter package installed in the sandbox.
    pub python_version: String,
    /// Git revision of pydep to install.
    pub pydep_version: String,
}

impl Default for PythonConfig {
    fn default() -> Self {
        PythonConfig {
            python_version: "python3".to_string(),
            pydep_version: "master".to_string(),
        }
    }
}

pub fn register(builder: &mut RegistryBuilder) {
    builder
        .variant::<PythonPackage>()
        .scanner(PYTHON, PythonScanner)
        .lister::<PythonPackage>(SandboxedLister(PydepList))
        .resolver::<Requirement>(RequirementResolver);
}

/// Reports a [`PythonPackage`] when the repository root looks like a
/// Python project.
pub struct PythonScanner;

#[async_trait]
impl Scanner for PythonScanner {
    async fn scan(&self, _ctx: &Context, dir: &Path, _repo: &RepoConfig) -> Result<Vec<Arc<dyn SourceUnit>>> {
        for marker in PROJECT_MARKERS {
            if tokio::fs::try_exists(dir.join(marker)).await? {
                tracing::debug!("Found {} in {}", marker, dir.display());
                let unit: Arc<dyn SourceUnit> = Arc::new(PythonPackage {});
                return Ok(vec![unit]);
            }
        }
        Ok(Vec::new())
    }
}

pub struct PydepList;

impl ListCommand for PydepList {
    fn list_command(&self, dir: &Path, _unit: &dyn SourceUnit, repo: &RepoConfig) -> Result<Command> {
        let config: PythonConfig = repo.toolchain_config(PYTHON)?.unwrap_or_default();
        Ok(Command::new(["pydep-run.py", "dep", SRC_ROOT])
            .image("ubuntu:22.04")
            .setup("apt-get update")
            .setup(format!("apt-get install -qy curl git {} python3-pip", config.python_version))
            .setup(format!(
                "pip install git+https://github.com/sourcegraph/pydep@{}",
                config.pydep_version
            ))
            .mount_ro(dir, SRC_ROOT)
            .transform(deps_from_pydep))
    }
}

/// Wrap each `pydep` requirement as a raw dependency.
pub fn deps_from_pydep(raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let requirements: Option<Vec<Requirement>> =
        serde_json::from_slice(raw).context("decoding pydep output")?;
    let deps = requirements
        .unwrap_or_default()
        .iter()
        .map(RawDependency::new)
        .collect::<srcgraph_core::Result<Vec<_>>>()?;
    Ok(serde_json::to_vec(&deps)?)
}

/// Points a requirement at its repository, when pydep found one.
pub struct RequirementResolver;

#[async_trait]
impl Resolver for RequirementResolver {
    async fn resolve(&self, _ctx: &Context, dep: &RawDependency, _repo: &RepoConfig) -> Result<Resolution> {
        let req: Requirement = dep.decode_target()?;
        if req.repo_url.is_empty() {
            return Ok(Resolution::Unresolved);
        }

        let version = req
            .specs
            .iter()
            .find(|(op, _)| op == "==")
            .map(|(_, version)| version.clone())
            .unwrap_or_default();
        Ok(Resolution::Resolved(ResolvedTarget {
            to_repo_clone_url: req.repo_url,
            to_unit: PythonPackage {}.name().to_string(),
            to_unit_type: PythonPackage::VARIANT.to_string(),
            to_version_string: version,
            to_rev_spec: String::new(),
        }))
    }
}
