//! Sandboxed command descriptors
//!
//! A plugin never runs its external tool itself. It describes the isolated
//! execution it needs (environment, mounts, invocation, where the output
//! appears) plus a pure function normalizing the raw output into canonical
//! JSON, and hands the description to a [`CommandRunner`](crate::CommandRunner).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Normalizes a tool's raw output into canonical JSON bytes.
pub type Transform = Arc<dyn Fn(&[u8]) -> anyhow::Result<Vec<u8>> + Send + Sync>;

/// Base image plus the setup steps run on top of it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub base_image: String,
    pub setup: Vec<String>,
}

impl Environment {
    pub fn new(base_image: impl Into<String>) -> Self {
        Environment {
            base_image: base_image.into(),
            setup: Vec::new(),
        }
    }

    /// Render as a Dockerfile, one `RUN` per setup step.
    pub fn dockerfile(&self) -> String {
        let mut dockerfile = format!("FROM {}\n", self.base_image);
        for step in &self.setup {
            dockerfile.push_str("RUN ");
            dockerfile.push_str(step);
            dockerfile.push('\n');
        }
        dockerfile
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new("ubuntu:22.04")
    }
}

/// A host path made visible inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    /// Absolute path inside the sandbox.
    pub sandbox: PathBuf,
    pub read_only: bool,
}

/// Where the tool leaves the output the runner should collect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputSource {
    #[default]
    Stdout,
    /// A file at this sandbox path, read once the tool exits.
    File(PathBuf),
}

/// Description of one isolated tool invocation.
#[derive(Clone, Default)]
pub struct Command {
    pub env: Environment,
    pub mounts: Vec<Mount>,
    pub argv: Vec<String>,
    /// Working directory inside the sandbox.
    pub dir: Option<PathBuf>,
    pub vars: Vec<(String, String)>,
    pub output: OutputSource,
    transform: Option<Transform>,
}

impl Command {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn image(mut self, base_image: impl Into<String>) -> Self {
        self.env.base_image = base_image.into();
        self
    }

    pub fn setup(mut self, step: impl Into<String>) -> Self {
        self.env.setup.push(step.into());
        self
    }

    pub fn mount_ro(mut self, host: impl Into<PathBuf>, sandbox: impl Into<PathBuf>) -> Self {
        self.mounts.push(Mount {
            host: host.into(),
            sandbox: sandbox.into(),
            read_only: true,
        });
        self
    }

    pub fn mount_rw(mut self, host: impl Into<PathBuf>, sandbox: impl Into<PathBuf>) -> Self {
        self.mounts.push(Mount {
            host: host.into(),
            sandbox: sandbox.into(),
            read_only: false,
        });
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.push((key.into(), value.into()));
        self
    }

    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = OutputSource::File(path.into());
        self
    }

    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&[u8]) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Program name for diagnostics.
    pub fn program(&self) -> &str {
        self.argv
            .first()
            .map(|p| {
                Path::new(p)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(p.as_str())
            })
            .unwrap_or("<empty>")
    }

    /// Apply the transform, or pass the output through unchanged.
    pub fn apply_transform(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        match &self.transform {
            Some(transform) => transform(raw),
            None => Ok(raw.to_vec()),
        }
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("env", &self.env)
            .field("mounts", &self.mounts)
            .field("argv", &self.argv)
            .field("dir", &self.dir)
            .field("vars", &self.vars)
            .field("output", &self.output)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dockerfile_rendering() {
        let cmd = Command::new(["jsg"])
            .image("node:20")
            .setup("npm install -g jsg@0.0.1")
            .setup("mkdir -p /srcgraph");
        assert_eq!(
            cmd.env.dockerfile(),
            "FROM node:20\nRUN npm install -g jsg@0.0.1\nRUN mkdir -p /srcgraph\n"
        );
    }

    #[test]
    fn test_program_name() {
        assert_eq!(Command::new(["/usr/local/bin/npm-deptool", "x@1"]).program(), "npm-deptool");
        assert_eq!(Command::new(Vec::<String>::new()).program(), "<empty>");
    }

    #[test]
    fn test_identity_transform() {
        let cmd = Command::new(["cat"]);
        assert!(!cmd.has_transform());
        assert_eq!(cmd.apply_transform(b"[1]").unwrap(), b"[1]".to_vec());

        let cmd = cmd.transform(|raw| Ok(raw.to_ascii_uppercase()));
        assert_eq!(cmd.apply_transform(b"abc").unwrap(), b"ABC".to_vec());
    }
}
