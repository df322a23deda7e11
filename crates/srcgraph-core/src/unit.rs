//! Source units: the typed, addressable subdivisions of a repository

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use ignore::WalkBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Separates the unit name from its variant in a [`UnitId`].
pub const ID_SEPARATOR: &str = "@";

/// A named, analyzable subdivision of a repository (a package, a module...).
///
/// Implementations are immutable once produced by a scanner and are shared
/// between concurrent plugin invocations as `Arc<dyn SourceUnit>`.
pub trait SourceUnit: Any + fmt::Debug + Send + Sync {
    /// Unique among all units of the same variant in one repository. Two
    /// units of different variants may share a name; use
    /// [`UnitRegistry::make_id`](crate::UnitRegistry::make_id) for a
    /// repository-wide identifier.
    fn name(&self) -> &str;

    /// Deepest directory containing every file of this unit.
    fn root_dir(&self) -> PathBuf;

    /// Files this unit comprises, relative to the repository root.
    fn paths(&self) -> Vec<PathBuf>;

    fn as_any(&self) -> &dyn Any;
}

/// A concrete source unit type that can be registered with a
/// [`UnitRegistry`](crate::UnitRegistry).
pub trait UnitVariant: SourceUnit + Serialize + DeserializeOwned + Sized {
    /// Discriminator this variant is registered under by default.
    const VARIANT: &'static str;
}

/// Repository-wide unit identifier: `name@variant`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(name: &str, variant: &str) -> Self {
        UnitId(format!("{name}{ID_SEPARATOR}{variant}"))
    }

    /// Split into `(name, variant)`.
    pub fn parse(&self) -> Result<(String, String)> {
        parse_id(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<UnitId> for String {
    fn from(id: UnitId) -> Self {
        id.0
    }
}

/// Parse a unit ID into `(name, variant)`, splitting at the first separator.
pub fn parse_id(id: &str) -> Result<(String, String)> {
    let (name, variant) = id
        .split_once(ID_SEPARATOR)
        .ok_or_else(|| CoreError::InvalidUnitId {
            id: id.to_string(),
            separator: ID_SEPARATOR,
        })?;
    Ok((name.to_string(), variant.to_string()))
}

/// Expand base-relative glob patterns into the existing files they match.
///
/// Hits are returned per pattern in pattern order, each pattern's hits sorted.
/// A pattern matching nothing contributes nothing.
pub fn expand_paths<S: AsRef<str>>(base: &Path, patterns: &[S]) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let files = list_files(base)?;
    let mut expanded = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let normalized = pattern.trim_start_matches("./");
        let matcher = GlobBuilder::new(normalized)
            .literal_separator(true)
            .build()
            .map_err(|source| CoreError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?
            .compile_matcher();

        let before = expanded.len();
        expanded.extend(
            files
                .iter()
                .filter(|rel| matcher.is_match(rel))
                .map(|rel| base.join(rel)),
        );
        tracing::debug!("Pattern {:?} matched {} files", pattern, expanded.len() - before);
    }
    Ok(expanded)
}

/// All files under `base`, relative to it, sorted.
fn list_files(base: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(base).standard_filters(false).build() {
        let entry = entry.map_err(|source| CoreError::Walk {
            path: base.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(base) {
            files.push(rel.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}
