//! Shared state handed to every plugin invocation

use std::sync::Arc;

use srcgraph_core::{SourceUnit, UnitRegistry, UnitVariant};

use crate::error::{Result, ToolchainError};
use crate::registry::Registry;
use crate::runner::CommandRunner;

/// The frozen registry plus the runner plugins execute their commands with.
///
/// Cheap to clone; concurrent invocations each hold their own copy.
#[derive(Debug, Clone)]
pub struct Context {
    registry: Arc<Registry>,
    runner: CommandRunner,
}

impl Context {
    pub fn new(registry: Arc<Registry>, runner: CommandRunner) -> Self {
        Context { registry, runner }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn units(&self) -> &UnitRegistry {
        self.registry.units()
    }
}

/// Downcast a unit handed to a plugin keyed by variant `U`.
pub fn expect_unit<U: UnitVariant>(unit: &dyn SourceUnit) -> Result<&U> {
    unit.as_any()
        .downcast_ref::<U>()
        .ok_or_else(|| ToolchainError::WrongUnit {
            expected: U::VARIANT,
            found: format!("{unit:?}"),
        })
}
