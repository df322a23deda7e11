//! Source unit discovery

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use srcgraph_core::{RepoConfig, SourceUnit, TaggedUnit};

use crate::command::Command;
use crate::context::Context;
use crate::error::{Result, ToolchainError};

/// Discovers the source units of one toolchain in a repository directory.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, ctx: &Context, dir: &Path, repo: &RepoConfig) -> Result<Vec<Arc<dyn SourceUnit>>>;
}

/// Describes a scan as a sandboxed command whose canonical output is a
/// variant-tagged unit array.
pub trait ScanCommand: Send + Sync {
    fn scan_command(&self, dir: &Path, repo: &RepoConfig) -> Result<Command>;
}

/// Runs a [`ScanCommand`] and decodes its output through the unit registry.
pub struct SandboxedScanner<B>(pub B);

#[async_trait]
impl<B: ScanCommand> Scanner for SandboxedScanner<B> {
    async fn scan(&self, ctx: &Context, dir: &Path, repo: &RepoConfig) -> Result<Vec<Arc<dyn SourceUnit>>> {
        let cmd = self.0.scan_command(dir, repo)?;
        let tagged: Vec<TaggedUnit> = ctx.runner().run(cmd).await?;
        tagged
            .into_iter()
            .map(|t| -> Result<Arc<dyn SourceUnit>> { Ok(ctx.units().decode(t)?) })
            .collect()
    }
}

impl Context {
    /// Run every registered scanner over `dir`.
    ///
    /// Scanners run concurrently; units come back grouped by scanner in
    /// registration order. Two units with the same ID are an error.
    pub async fn scan(&self, dir: &Path, repo: &RepoConfig) -> Result<Vec<Arc<dyn SourceUnit>>> {
        let runs = self.registry().scanners().map(|(name, scanner)| async move {
            let units = scanner.scan(self, dir, repo).await?;
            tracing::debug!("Scanner {} found {} units", name, units.len());
            Ok::<_, ToolchainError>(units)
        });
        let found = try_join_all(runs).await?;

        let mut seen = HashSet::new();
        let mut units = Vec::new();
        for unit in found.into_iter().flatten() {
            let id = self.units().make_id(unit.as_ref())?;
            if !seen.insert(id.clone()) {
                return Err(ToolchainError::DuplicateUnit(id));
            }
            units.push(unit);
        }

        tracing::info!("Scanned {} source units in {}", units.len(), dir.display());
        Ok(units)
    }

    /// Run the scanner registered under `name` only.
    pub async fn scan_with(&self, name: &str, dir: &Path, repo: &RepoConfig) -> Result<Vec<Arc<dyn SourceUnit>>> {
        let scanner = self.registry().scanner(name)?;
        scanner.scan(self, dir, repo).await
    }
}
