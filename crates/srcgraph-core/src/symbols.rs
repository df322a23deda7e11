//! Symbol index for cross-unit reference lookup

use dashmap::DashMap;

use crate::model::{GraphOutput, Ref, Symbol, SymbolKey};
use crate::unit::UnitId;

/// Symbols by key, filled concurrently as units finish graphing.
pub struct SymbolIndex {
    symbols: DashMap<SymbolKey, Symbol>,
    /// unit -> keys of the symbols it defined
    unit_symbols: DashMap<UnitId, Vec<SymbolKey>>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        SymbolIndex {
            symbols: DashMap::new(),
            unit_symbols: DashMap::new(),
        }
    }

    /// Add every symbol of one unit's output, replacing a previous run of
    /// the same unit.
    pub fn insert_output(&self, unit: UnitId, output: &GraphOutput) {
        self.remove_unit(&unit);
        let keys: Vec<SymbolKey> = output.symbols.iter().map(|s| s.key.clone()).collect();
        for symbol in &output.symbols {
            self.symbols.insert(symbol.key.clone(), symbol.clone());
        }
        self.unit_symbols.insert(unit, keys);
    }

    pub fn lookup(&self, key: &SymbolKey) -> Option<Symbol> {
        self.symbols.get(key).map(|r| r.value().clone())
    }

    /// Whether a reference points at a symbol defined in this index.
    pub fn resolves(&self, reference: &Ref) -> bool {
        self.symbols.contains_key(&reference.symbol_key())
    }

    pub fn symbols_in_unit(&self, unit: &UnitId) -> Vec<Symbol> {
        self.unit_symbols
            .get(unit)
            .map(|r| {
                r.value()
                    .iter()
                    .filter_map(|key| self.symbols.get(key).map(|s| s.value().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn remove_unit(&self, unit: &UnitId) {
        if let Some((_, keys)) = self.unit_symbols.remove(unit) {
            for key in keys {
                self.symbols.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for SymbolIndex {
    fn default() -> Self {
        Self::new()
    }
}
