//! Reference toolchains

pub mod javascript;
pub mod python;

use crate::registry::RegistryBuilder;

/// Register every bundled toolchain.
pub fn register_all(builder: &mut RegistryBuilder) -> &mut RegistryBuilder {
    javascript::register(builder);
    python::register(builder);
    builder
}
