//! Dependency listing and resolution

use std::path::Path;

use async_trait::async_trait;
use srcgraph_core::{RawDependency, RepoConfig, Resolution, ResolvedDep, SourceUnit};

use crate::command::Command;
use crate::context::Context;
use crate::error::Result;

/// Lists the raw dependencies of one source unit.
#[async_trait]
pub trait Lister: Send + Sync {
    async fn list(
        &self,
        ctx: &Context,
        dir: &Path,
        unit: &dyn SourceUnit,
        repo: &RepoConfig,
    ) -> Result<Vec<RawDependency>>;
}

/// Resolves raw dependencies of one target type.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, ctx: &Context, dep: &RawDependency, repo: &RepoConfig) -> Result<Resolution>;
}

/// Describes listing as a sandboxed command whose canonical output is a
/// `RawDependency` array.
pub trait ListCommand: Send + Sync {
    fn list_command(&self, dir: &Path, unit: &dyn SourceUnit, repo: &RepoConfig) -> Result<Command>;
}

/// Describes resolution as a sandboxed command whose canonical output is a
/// resolved target, or `null` / nothing when the dependency has none.
pub trait ResolveCommand: Send + Sync {
    fn resolve_command(&self, dep: &RawDependency, repo: &RepoConfig) -> Result<Command>;
}

pub struct SandboxedLister<B>(pub B);

#[async_trait]
impl<B: ListCommand> Lister for SandboxedLister<B> {
    async fn list(
        &self,
        ctx: &Context,
        dir: &Path,
        unit: &dyn SourceUnit,
        repo: &RepoConfig,
    ) -> Result<Vec<RawDependency>> {
        let cmd = self.0.list_command(dir, unit, repo)?;
        Ok(ctx.runner().run(cmd).await?)
    }
}

pub struct SandboxedResolver<B>(pub B);

#[async_trait]
impl<B: ResolveCommand> Resolver for SandboxedResolver<B> {
    async fn resolve(&self, ctx: &Context, dep: &RawDependency, repo: &RepoConfig) -> Result<Resolution> {
        let cmd = self.0.resolve_command(dep, repo)?;
        Ok(ctx.runner().run(cmd).await?)
    }
}

impl Context {
    /// List the raw dependencies of `unit` with the lister for its variant.
    ///
    /// Dependencies the lister left without an originating unit are
    /// attributed to `unit`.
    pub async fn list_deps(
        &self,
        dir: &Path,
        unit: &dyn SourceUnit,
        repo: &RepoConfig,
    ) -> Result<Vec<RawDependency>> {
        let variant = self.units().variant_of(unit)?.to_string();
        let lister = self.registry().lister(&variant)?;
        let deps = lister.list(self, dir, unit, repo).await?;
        tracing::debug!("Listed {} dependencies of {}@{}", deps.len(), unit.name(), variant);
        Ok(deps
            .into_iter()
            .map(|dep| dep.with_origin(unit.name(), &variant))
            .collect())
    }

    /// Resolve one raw dependency with the resolver for its target type.
    pub async fn resolve(&self, dep: &RawDependency, repo: &RepoConfig) -> Result<Resolution> {
        let resolver = self.registry().resolver(&dep.target_type)?;
        resolver.resolve(self, dep, repo).await
    }

    /// Resolve `deps` in order into cross-repository edges.
    ///
    /// Unresolved dependencies produce no edge. The first failure aborts
    /// the batch and nothing resolved so far is returned.
    pub async fn resolve_all(&self, deps: &[RawDependency], repo: &RepoConfig) -> Result<Vec<ResolvedDep>> {
        let mut edges = Vec::with_capacity(deps.len());
        for dep in deps {
            match self.resolve(dep, repo).await? {
                Resolution::Resolved(target) => edges.push(ResolvedDep::new(&repo.uri, dep, target)?),
                Resolution::Unresolved => tracing::warn!(
                    "Unresolved {} dependency {} from {}@{}",
                    dep.target_type,
                    dep.target,
                    dep.from_unit,
                    dep.from_unit_type
                ),
            }
        }
        tracing::info!("Resolved {} of {} dependencies", edges.len(), deps.len());
        Ok(edges)
    }
}
