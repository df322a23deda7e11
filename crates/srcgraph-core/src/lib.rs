//! srcgraph core: source unit identity, dependency records and the canonical graph schema

pub mod cache;
pub mod dep;
pub mod error;
pub mod model;
pub mod repo;
pub mod symbols;
pub mod unit;
pub mod variants;


#[cfg(test)]
pub mod test_utils;

pub use cache::{BUILD_DATA_DIR, UNITS_FILE, MAKEFILE, build_data_dir, units_path, ensure_build_data_dir, save_units, load_units, clear_build_data};
pub use dep::{DependencyTarget, RawDependency, ResolvedTarget, Resolution, ResolvedDep};
pub use error::{CoreError, Result};
pub use model::{SymbolKey, Symbol, Ref, Doc, GraphOutput, OutputSummary};
pub use repo::{CONFIG_FILE, RepoUri, RepoConfig};
pub use symbols::SymbolIndex;
pub use unit::{ID_SEPARATOR, SourceUnit, UnitVariant, UnitId, parse_id, expand_paths};
pub use variants::{TaggedUnit, UnitRegistry};
