//! Toolchain plugins and the sandboxed command contract they share

pub mod command;
pub mod context;
pub mod dep;
pub mod error;
pub mod grapher;
pub mod registry;
pub mod runner;
pub mod sandbox;
pub mod scan;
pub mod toolchains;


#[cfg(test)]
pub mod test_utils;

pub use command::{Command, Environment, Mount, OutputSource, Transform};
pub use context::{Context, expect_unit};
pub use dep::{ListCommand, Lister, ResolveCommand, Resolver, SandboxedLister, SandboxedResolver};
pub use error::{CommandError, FailureKind, PluginKind, Result, ToolchainError};
pub use grapher::{GraphCommand, Grapher, SandboxedGrapher};
pub use registry::{Registry, RegistryBuilder};
pub use runner::{CommandRunner, RawOutput};
pub use sandbox::{DockerSandbox, Execution, LocalSandbox, Sandbox};
pub use scan::{SandboxedScanner, ScanCommand, Scanner};
