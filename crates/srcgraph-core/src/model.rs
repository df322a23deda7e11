//! Canonical graph output schema shared by every grapher

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::repo::RepoUri;

/// Identifies a symbol across repositories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SymbolKey {
    pub repo: RepoUri,
    pub unit_type: String,
    pub unit: String,
    /// Hierarchical path, unique within one unit's graph output.
    pub path: String,
}

/// A definition extracted by a grapher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Symbol {
    #[serde(flatten)]
    pub key: SymbolKey,
    pub name: String,
    /// General kind: `func`, `type`, `var`, `const`, `field`, `module`, `package`.
    pub kind: String,
    #[serde(default)]
    pub type_expr: String,
    pub file: String,
    pub def_start: u32,
    pub def_end: u32,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub callable: bool,
}

/// A located reference to a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Ref {
    pub symbol_repo: RepoUri,
    pub symbol_unit_type: String,
    pub symbol_unit: String,
    pub symbol_path: String,
    /// The reference is the symbol's own definition site.
    #[serde(default)]
    pub def: bool,
    pub repo: RepoUri,
    pub unit_type: String,
    pub unit: String,
    pub file: String,
    pub start: u32,
    pub end: u32,
}

impl Ref {
    pub fn symbol_key(&self) -> SymbolKey {
        SymbolKey {
            repo: self.symbol_repo.clone(),
            unit_type: self.symbol_unit_type.clone(),
            unit: self.symbol_unit.clone(),
            path: self.symbol_path.clone(),
        }
    }
}

/// Documentation attached to a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Doc {
    #[serde(flatten)]
    pub key: SymbolKey,
    /// MIME type of `data`, e.g. `text/plain` or `text/html`.
    pub format: String,
    pub data: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

/// Everything a grapher extracted from one source unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct GraphOutput {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<Symbol>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<Ref>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<Doc>,
}

impl GraphOutput {
    /// Reject output in which two symbols share a key.
    ///
    /// Duplicates are never dropped silently: they point at a toolchain bug.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&SymbolKey, &Symbol> = HashMap::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            if let Some(first) = seen.insert(&symbol.key, symbol) {
                return Err(CoreError::DuplicateSymbolPath {
                    path: symbol.key.path.clone(),
                    first: format!("{first:?}"),
                    second: format!("{symbol:?}"),
                });
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> OutputSummary {
        OutputSummary {
            symbols: self.symbols.len(),
            refs: self.refs.len(),
            docs: self.docs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.refs.is_empty() && self.docs.is_empty()
    }
}

/// Per-unit counts reported by the `graph` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputSummary {
    pub symbols: usize,
    pub refs: usize,
    pub docs: usize,
}

impl std::ops::AddAssign for OutputSummary {
    fn add_assign(&mut self, other: Self) {
        self.symbols += other.symbols;
        self.refs += other.refs;
        self.docs += other.docs;
    }
}
