//! Error types for the unit model and canonical schemas

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("no {separator:?} in source unit ID {id:?}")]
    InvalidUnitId { id: String, separator: &'static str },

    #[error("source unit variant not registered: {0}")]
    UnknownVariant(String),

    #[error("raw dependency has target type {found:?}, expected {expected:?}")]
    TargetTypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("resolved target for {from_unit}@{from_unit_type} ({target_type}) has no clone URL")]
    MissingCloneUrl {
        from_unit: String,
        from_unit_type: String,
        target_type: String,
    },

    #[error("duplicate path in symbols output: {path:?}\nsymbol 1: {first}\nsymbol 2: {second}")]
    DuplicateSymbolPath {
        path: String,
        first: String,
        second: String,
    },

    #[error("invalid path pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("walking {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    #[error("invalid repository config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
