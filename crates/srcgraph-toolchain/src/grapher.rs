//! Symbol, reference and documentation extraction

use std::path::Path;

use async_trait::async_trait;
use srcgraph_core::{GraphOutput, RepoConfig, SourceUnit};

use crate::command::Command;
use crate::context::Context;
use crate::error::Result;

/// Extracts the canonical graph of one source unit.
#[async_trait]
pub trait Grapher: Send + Sync {
    async fn graph(
        &self,
        ctx: &Context,
        dir: &Path,
        unit: &dyn SourceUnit,
        repo: &RepoConfig,
    ) -> Result<GraphOutput>;
}

/// Describes graphing as a sandboxed command whose canonical output is a
/// [`GraphOutput`].
pub trait GraphCommand: Send + Sync {
    fn graph_command(&self, dir: &Path, unit: &dyn SourceUnit, repo: &RepoConfig) -> Result<Command>;
}

pub struct SandboxedGrapher<B>(pub B);

#[async_trait]
impl<B: GraphCommand> Grapher for SandboxedGrapher<B> {
    async fn graph(
        &self,
        ctx: &Context,
        dir: &Path,
        unit: &dyn SourceUnit,
        repo: &RepoConfig,
    ) -> Result<GraphOutput> {
        let cmd = self.0.graph_command(dir, unit, repo)?;
        Ok(ctx.runner().run(cmd).await?)
    }
}

impl Context {
    /// Graph `unit` with the grapher for its variant.
    ///
    /// Output with two symbols at the same path in one unit is rejected
    /// as a whole.
    pub async fn graph(&self, dir: &Path, unit: &dyn SourceUnit, repo: &RepoConfig) -> Result<GraphOutput> {
        let grapher = self.registry().grapher_for(unit)?;
        let output = grapher.graph(self, dir, unit, repo).await?;
        output.validate()?;

        let summary = output.summary();
        tracing::debug!(
            "Graphed {}: {} symbols, {} refs, {} docs",
            unit.name(),
            summary.symbols,
            summary.refs,
            summary.docs
        );
        Ok(output)
    }
}
