//! Error types for build rule assembly

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("rule maker {name} failed: {source:#}")]
    RuleMaker {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("build rules form a cycle through {target}")]
    Cycle { target: String },
}
