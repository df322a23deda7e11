//! Host-process sandbox backed by a per-invocation scratch directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use ignore::WalkBuilder;
use tempfile::TempDir;
use tokio::process;

use super::{Execution, Sandbox, environment_error, host_path};
use crate::command::{Command, Mount, OutputSource};
use crate::error::CommandError;

const NAME: &str = "local";

/// Runs tools directly on the host.
///
/// Every invocation gets its own scratch directory standing in for the
/// sandbox filesystem root: read-only mounts are copied into it, read-write
/// mounts are symlinked, and sandbox paths in argv and the working directory
/// are rewritten onto it. The base image is not used; setup steps run
/// through `sh -c` inside the scratch directory, unless the host is
/// declared to provide the environment already.
#[derive(Debug, Clone, Default)]
pub struct LocalSandbox {
    scratch_root: Option<PathBuf>,
    skip_setup: bool,
}

impl LocalSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create scratch directories under `dir` instead of the system temp dir.
    pub fn with_scratch_root(dir: impl Into<PathBuf>) -> Self {
        LocalSandbox {
            scratch_root: Some(dir.into()),
            ..Default::default()
        }
    }

    /// Trust the host to have the tools installed and skip setup steps.
    pub fn host_environment(mut self) -> Self {
        self.skip_setup = true;
        self
    }

    fn scratch_dir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("srcgraph-sandbox-");
        match &self.scratch_root {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(&self, cmd: &Command) -> Result<Execution, CommandError> {
        if cmd.argv.is_empty() {
            return Err(environment_error(NAME, cmd, "empty argv"));
        }

        // Removed when dropped, whichever way this function is left.
        let scratch = self
            .scratch_dir()
            .map_err(|e| environment_error(NAME, cmd, format!("creating scratch dir: {e}")))?;
        let root = scratch.path().to_path_buf();
        tracing::debug!("Local sandbox for {} at {}", cmd.program(), root.display());

        let mounts = cmd.mounts.clone();
        let mount_root = root.clone();
        tokio::task::spawn_blocking(move || materialize_mounts(&mount_root, &mounts))
            .await
            .map_err(|e| environment_error(NAME, cmd, e))?
            .map_err(|e| environment_error(NAME, cmd, format!("mounting: {e}")))?;

        let setup: &[String] = if self.skip_setup { &[] } else { &cmd.env.setup };
        for step in setup {
            let out = process::Command::new("sh")
                .arg("-c")
                .arg(step)
                .current_dir(&root)
                .env("SANDBOX_ROOT", &root)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| environment_error(NAME, cmd, format!("setup step {step:?}: {e}")))?;
            if !out.status.success() {
                return Err(environment_error(
                    NAME,
                    cmd,
                    format!(
                        "setup step {step:?} failed ({}): {}",
                        out.status,
                        String::from_utf8_lossy(&out.stderr).trim()
                    ),
                ));
            }
        }

        let argv: Vec<String> = cmd
            .argv
            .iter()
            .map(|arg| rewrite_arg(&root, &cmd.mounts, arg))
            .collect();
        let workdir = cmd
            .dir
            .as_ref()
            .map_or_else(|| root.clone(), |dir| host_path(&root, dir));

        let mut process = process::Command::new(&argv[0]);
        process
            .args(&argv[1..])
            .current_dir(&workdir)
            .env("SANDBOX_ROOT", &root)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &cmd.vars {
            process.env(key, value);
        }

        let out = process
            .output()
            .await
            .map_err(|e| environment_error(NAME, cmd, format!("starting {}: {e}", argv[0])))?;
        let success = out.status.success();

        let output = match &cmd.output {
            OutputSource::Stdout => out.stdout,
            OutputSource::File(path) => match tokio::fs::read(host_path(&root, path)).await {
                Ok(data) => data,
                Err(_) if !success => Vec::new(),
                Err(e) => {
                    return Err(CommandError::UnusableOutput {
                        program: cmd.program().to_string(),
                        source: anyhow::anyhow!("reading output file {}: {e}", path.display()),
                        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                    });
                }
            },
        };

        tracing::debug!("{} finished in local sandbox: {}", cmd.program(), out.status);
        Ok(Execution {
            success,
            status: out.status.to_string(),
            output,
            stderr: out.stderr,
        })
    }
}

/// Point arguments naming a mounted sandbox path at the scratch copy.
fn rewrite_arg(root: &Path, mounts: &[Mount], arg: &str) -> String {
    let path = Path::new(arg);
    if path.is_absolute() && mounts.iter().any(|m| path.starts_with(&m.sandbox)) {
        host_path(root, path).to_string_lossy().into_owned()
    } else {
        arg.to_string()
    }
}

fn materialize_mounts(root: &Path, mounts: &[Mount]) -> io::Result<()> {
    for mount in mounts {
        let target = host_path(root, &mount.sandbox);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if mount.read_only {
            copy_tree(&mount.host, &target)?;
        } else {
            link(&mount.host, &target)?;
        }
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_file() {
        fs::copy(src, dst)?;
        return Ok(());
    }

    for entry in WalkBuilder::new(src).standard_filters(false).build() {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let dest = dst.join(rel);
        match entry.file_type() {
            Some(t) if t.is_dir() => fs::create_dir_all(&dest)?,
            Some(t) if t.is_file() => {
                fs::copy(entry.path(), &dest)?;
            }
            _ => tracing::debug!("Skipping {} while copying mount", entry.path().display()),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn link(src: &Path, dst: &Path) -> io::Result<()> {
    let src = fs::canonicalize(src)?;
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(not(unix))]
fn link(src: &Path, dst: &Path) -> io::Result<()> {
    tracing::warn!(
        "Read-write mount of {} is copied; writes will not reach the host",
        src.display()
    );
    copy_tree(src, dst)
}
