//! Sandbox backends that actually execute [`Command`]s
//!
//! A backend owns the whole lifecycle of one invocation: it builds the
//! environment, materializes the mounts, runs the tool, collects the output
//! and tears everything down again. Teardown happens on every exit path,
//! including when the calling future is dropped mid-invocation.

pub mod docker;
pub mod local;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::command::Command;
use crate::error::CommandError;

pub use docker::DockerSandbox;
pub use local::LocalSandbox;

/// What a finished invocation left behind.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub success: bool,
    /// Human-readable exit status, e.g. `exit status: 2`.
    pub status: String,
    /// Contents of the command's output source.
    pub output: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Run one command in a fresh sandbox.
    ///
    /// A tool exiting unsuccessfully is not an error at this level; only a
    /// failure to prepare or start the sandbox is.
    async fn execute(&self, cmd: &Command) -> Result<Execution, CommandError>;
}

/// Map an absolute sandbox path onto a directory standing in for the
/// sandbox's filesystem root.
pub(crate) fn host_path(root: &Path, sandbox_path: &Path) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in sandbox_path.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::ParentDir => {
                if path != root {
                    path.pop();
                }
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    path
}

pub(crate) fn environment_error(
    sandbox: &'static str,
    cmd: &Command,
    message: impl std::fmt::Display,
) -> CommandError {
    CommandError::Environment {
        sandbox,
        program: cmd.program().to_string(),
        message: message.to_string(),
    }
}
