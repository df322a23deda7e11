//! Rule maker registry and the assembled Makefile

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use srcgraph_core::RepoConfig;

use crate::error::{BuildError, Result};
use crate::rule::BuildRule;

/// Phony target depending on every generated target.
pub const ALL_TARGET: &str = "all";

/// Tells make to remove a target whose recipe failed.
pub const DELETE_ON_ERROR: &str = ".DELETE_ON_ERROR";

/// Produces rules for one analysis stage.
///
/// Receives the repository, the output directory and every rule produced
/// by makers registered before it.
pub type RuleMaker =
    Box<dyn Fn(&RepoConfig, &Path, &[BuildRule]) -> anyhow::Result<Vec<BuildRule>> + Send + Sync>;

/// Ordered, named rule makers.
#[derive(Default)]
pub struct RuleMakers {
    makers: Vec<(String, RuleMaker)>,
}

impl RuleMakers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a maker, run after every maker registered so far.
    ///
    /// # Panics
    ///
    /// If `name` is empty or already registered.
    pub fn register<F>(&mut self, name: &str, maker: F) -> &mut Self
    where
        F: Fn(&RepoConfig, &Path, &[BuildRule]) -> anyhow::Result<Vec<BuildRule>> + Send + Sync + 'static,
    {
        if name.is_empty() {
            panic!("build: register called with an empty rule maker name");
        }
        if self.makers.iter().any(|(existing, _)| existing == name) {
            panic!("build: register called twice for rule maker {name}");
        }
        self.makers.push((name.to_string(), Box::new(maker)));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.makers.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.makers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.makers.is_empty()
    }

    /// Run every maker in order and assemble their rules.
    ///
    /// The first failing maker aborts assembly. The result starts with an
    /// `all` rule over every generated target and ends with
    /// `.DELETE_ON_ERROR`.
    pub fn create_makefile(&self, output_dir: &Path, repo: &RepoConfig) -> Result<Makefile> {
        let mut rules: Vec<BuildRule> = Vec::new();
        for (name, maker) in &self.makers {
            let made = maker(repo, output_dir, &rules).map_err(|source| BuildError::RuleMaker {
                name: name.clone(),
                source,
            })?;
            tracing::debug!("Rule maker {} produced {} rules", name, made.len());
            rules.extend(made);
        }

        let all = BuildRule::new(ALL_TARGET).prereqs(rules.iter().map(|r| r.target.clone()));
        rules.insert(0, all);
        rules.push(BuildRule::new(DELETE_ON_ERROR));

        tracing::info!("Assembled {} build rules for {}", rules.len(), repo.uri);
        Ok(Makefile { rules })
    }
}

impl fmt::Debug for RuleMakers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleMakers").field("makers", &self.names()).finish()
    }
}

/// Assembled build rules, in make order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Makefile {
    rules: Vec<BuildRule>,
}

impl Makefile {
    pub fn rules(&self) -> &[BuildRule] {
        &self.rules
    }

    pub fn rule(&self, target: &str) -> Option<&BuildRule> {
        self.rules.iter().find(|r| r.target == target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.target.as_str())
    }

    /// Files and targets as nodes, with an edge from each prerequisite to
    /// the target that needs it.
    pub fn dependency_graph(&self) -> DiGraph<String, ()> {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

        for rule in &self.rules {
            let target = *nodes
                .entry(rule.target.as_str())
                .or_insert_with(|| graph.add_node(rule.target.clone()));
            for prereq in &rule.prereqs {
                let source = *nodes
                    .entry(prereq.as_str())
                    .or_insert_with(|| graph.add_node(prereq.clone()));
                graph.add_edge(source, target, ());
            }
        }
        graph
    }

    /// Targets ordered so every target comes after its prerequisites.
    ///
    /// Plain source files and special targets are left out.
    pub fn build_order(&self) -> Result<Vec<&BuildRule>> {
        let graph = self.dependency_graph();
        let order = toposort(&graph, None).map_err(|cycle| BuildError::Cycle {
            target: graph[cycle.node_id()].clone(),
        })?;

        Ok(order
            .into_iter()
            .filter_map(|idx| self.rule(&graph[idx]))
            .filter(|rule| !rule.is_special())
            .collect())
    }
}

impl fmt::Display for Makefile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{rule}")?;
        }
        Ok(())
    }
}
