//! Build data directory layout

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::unit::SourceUnit;
use crate::variants::UnitRegistry;

/// Build data directory: .srcgraph/
pub const BUILD_DATA_DIR: &str = ".srcgraph";

/// Scanned units file
pub const UNITS_FILE: &str = "units.json";

/// Generated makefile
pub const MAKEFILE: &str = "Makefile";

/// Get build data directory path
pub fn build_data_dir(root: &Path) -> PathBuf {
    root.join(BUILD_DATA_DIR)
}

/// Get scanned units file path
pub fn units_path(data_dir: &Path) -> PathBuf {
    data_dir.join(UNITS_FILE)
}

/// Ensure build data directory exists
pub fn ensure_build_data_dir(root: &Path) -> std::io::Result<PathBuf> {
    let dir = build_data_dir(root);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Persist scanned units as a variant-tagged JSON array.
pub fn save_units(
    units: &UnitRegistry,
    source_units: &[Arc<dyn SourceUnit>],
    data_dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    let path = units_path(data_dir);
    let tagged = units.encode_all(source_units)?;
    std::fs::write(&path, serde_json::to_string_pretty(&tagged)?)?;

    tracing::debug!("Saved {} units to {}", source_units.len(), path.display());
    Ok(path)
}

/// Load previously scanned units, if any were saved.
pub fn load_units(units: &UnitRegistry, data_dir: &Path) -> Result<Option<Vec<Arc<dyn SourceUnit>>>> {
    let path = units_path(data_dir);
    if !path.exists() {
        return Ok(None);
    }

    let data = std::fs::read(&path)?;
    let loaded = units.decode_all(&data)?;
    tracing::debug!("Loaded {} units from {}", loaded.len(), path.display());
    Ok(Some(loaded))
}

/// Clear build data directory
pub fn clear_build_data(root: &Path) -> std::io::Result<()> {
    let dir = build_data_dir(root);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
}
