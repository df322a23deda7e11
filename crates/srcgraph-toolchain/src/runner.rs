//! Generic execution of sandboxed command descriptors

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::command::Command;
use crate::error::CommandError;
use crate::sandbox::{LocalSandbox, Sandbox};

/// Transformed output of a successful run, with whatever the tool wrote
/// to stderr on the way.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub canonical: Vec<u8>,
    pub stderr: String,
}

/// Executes [`Command`]s in a sandbox backend and decodes their canonical
/// output. The only component that touches a sandbox.
#[derive(Clone)]
pub struct CommandRunner {
    sandbox: Arc<dyn Sandbox>,
}

impl CommandRunner {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        CommandRunner { sandbox }
    }

    pub fn local() -> Self {
        CommandRunner::new(Arc::new(LocalSandbox::new()))
    }

    pub fn sandbox_name(&self) -> &'static str {
        self.sandbox.name()
    }

    /// Run `cmd` and return its transformed output bytes.
    pub async fn run_raw(&self, cmd: &Command) -> Result<RawOutput, CommandError> {
        tracing::debug!(
            "Running {} in {} sandbox: {:?}",
            cmd.program(),
            self.sandbox.name(),
            cmd.argv
        );
        let exec = self.sandbox.execute(cmd).await?;
        let stderr = String::from_utf8_lossy(&exec.stderr).into_owned();

        if !exec.success {
            return Err(CommandError::Exited {
                program: cmd.program().to_string(),
                status: exec.status,
                stderr,
            });
        }

        match cmd.apply_transform(&exec.output) {
            Ok(canonical) => Ok(RawOutput { canonical, stderr }),
            Err(source) => Err(CommandError::UnusableOutput {
                program: cmd.program().to_string(),
                source,
                stderr,
            }),
        }
    }

    /// Run `cmd` and deserialize its canonical output as `T`.
    ///
    /// Empty output (after the transform) is `T::default()`.
    pub async fn run<T>(&self, cmd: Command) -> Result<T, CommandError>
    where
        T: DeserializeOwned + Default,
    {
        let RawOutput { canonical, stderr } = self.run_raw(&cmd).await?;
        if canonical.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }

        serde_json::from_slice(&canonical).map_err(|source| CommandError::SchemaMismatch {
            program: cmd.program().to_string(),
            expected: std::any::type_name::<T>(),
            source,
            output: String::from_utf8_lossy(&canonical).into_owned(),
            stderr,
        })
    }
}

impl std::fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRunner")
            .field("sandbox", &self.sandbox.name())
            .finish()
    }
}
