//! Docker-backed sandbox

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process;

use super::{Execution, Sandbox, environment_error};
use crate::command::{Command, OutputSource};
use crate::error::CommandError;

const NAME: &str = "docker";

static NEXT_INVOCATION: AtomicU64 = AtomicU64::new(0);

/// Builds an image per invocation from the command's environment and runs
/// the tool in a fresh container.
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    docker: PathBuf,
}

impl Default for DockerSandbox {
    fn default() -> Self {
        DockerSandbox {
            docker: PathBuf::from("docker"),
        }
    }
}

impl DockerSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific docker-compatible client binary.
    pub fn with_client(docker: impl Into<PathBuf>) -> Self {
        DockerSandbox {
            docker: docker.into(),
        }
    }

    fn docker(&self) -> process::Command {
        let mut cmd = process::Command::new(&self.docker);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    async fn build_image(&self, cmd: &Command, tag: &str) -> Result<(), CommandError> {
        let mut child = self
            .docker()
            .args(["build", "-q", "-t", tag, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| environment_error(NAME, cmd, format!("starting docker build: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(cmd.env.dockerfile().as_bytes())
                .await
                .map_err(|e| environment_error(NAME, cmd, format!("writing Dockerfile: {e}")))?;
        }

        let out = child
            .wait_with_output()
            .await
            .map_err(|e| environment_error(NAME, cmd, format!("docker build: {e}")))?;
        if !out.status.success() {
            return Err(environment_error(
                NAME,
                cmd,
                format!(
                    "docker build failed ({}): {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            ));
        }
        Ok(())
    }

    async fn copy_out(
        &self,
        cmd: &Command,
        container: &str,
        path: &std::path::Path,
    ) -> Result<Vec<u8>, CommandError> {
        let out = self
            .docker()
            .arg("cp")
            .arg(format!("{container}:{}", path.display()))
            .arg("-")
            .output()
            .await
            .map_err(|e| environment_error(NAME, cmd, format!("docker cp: {e}")))?;
        if !out.status.success() {
            return Err(CommandError::UnusableOutput {
                program: cmd.program().to_string(),
                source: anyhow::anyhow!(
                    "copying output file {}: {}",
                    path.display(),
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
                stderr: String::new(),
            });
        }
        untar_single_file(&out.stdout).map_err(|source| CommandError::UnusableOutput {
            program: cmd.program().to_string(),
            source,
            stderr: String::new(),
        })
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(&self, cmd: &Command) -> Result<Execution, CommandError> {
        if cmd.argv.is_empty() {
            return Err(environment_error(NAME, cmd, "empty argv"));
        }

        let id = format!(
            "srcgraph-{}-{}",
            std::process::id(),
            NEXT_INVOCATION.fetch_add(1, Ordering::Relaxed)
        );
        // Removes the container and image when dropped, on every exit path.
        let _cleanup = Cleanup {
            docker: self.docker.clone(),
            container: id.clone(),
            image: id.clone(),
        };

        tracing::debug!("Building image {} for {}", id, cmd.program());
        self.build_image(cmd, &id).await?;

        let out = self
            .docker()
            .args(run_args(cmd, &id, &id))
            .output()
            .await
            .map_err(|e| environment_error(NAME, cmd, format!("docker run: {e}")))?;
        let success = out.status.success();

        let output = match &cmd.output {
            OutputSource::Stdout => out.stdout,
            OutputSource::File(_) if !success => Vec::new(),
            OutputSource::File(path) => match self.copy_out(cmd, &id, path).await {
                Ok(data) => data,
                Err(CommandError::UnusableOutput { program, source, .. }) => {
                    return Err(CommandError::UnusableOutput {
                        program,
                        source,
                        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                    });
                }
                Err(err) => return Err(err),
            },
        };

        tracing::debug!("{} finished in container {}: {}", cmd.program(), id, out.status);
        Ok(Execution {
            success,
            status: out.status.to_string(),
            output,
            stderr: out.stderr,
        })
    }
}

/// Arguments to `docker` running `cmd` as container `name` from `image`.
pub fn run_args(cmd: &Command, name: &str, image: &str) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--name".to_string(), name.to_string()];
    for mount in &cmd.mounts {
        let mut spec = format!("{}:{}", mount.host.display(), mount.sandbox.display());
        if mount.read_only {
            spec.push_str(":ro");
        }
        args.push("-v".to_string());
        args.push(spec);
    }
    if let Some(dir) = &cmd.dir {
        args.push("-w".to_string());
        args.push(dir.display().to_string());
    }
    for (key, value) in &cmd.vars {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(image.to_string());
    args.extend(cmd.argv.iter().cloned());
    args
}

/// `docker cp <container>:<file> -` streams a tar archive holding the file,
/// possibly preceded by PAX or GNU long-name headers.
fn untar_single_file(archive: &[u8]) -> anyhow::Result<Vec<u8>> {
    const BLOCK: usize = 512;
    let mut offset = 0;
    loop {
        let header = archive
            .get(offset..offset + BLOCK)
            .ok_or_else(|| anyhow::anyhow!("truncated tar stream ({} bytes)", archive.len()))?;
        if header.iter().all(|&b| b == 0) {
            anyhow::bail!("tar stream holds no regular file");
        }

        let size = entry_size(header)?;
        let body = offset + BLOCK;
        match header[156] {
            b'0' | b'\0' => {
                return archive
                    .get(body..body + size)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| anyhow::anyhow!("tar entry shorter than its declared {size} bytes"));
            }
            kind => {
                tracing::debug!("Skipping tar entry of type {:?}", kind as char);
                offset = body + size.div_ceil(BLOCK) * BLOCK;
            }
        }
    }
}

fn entry_size(header: &[u8]) -> anyhow::Result<usize> {
    let field = std::str::from_utf8(&header[124..136])?;
    let field = field.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    usize::from_str_radix(field, 8).map_err(|e| anyhow::anyhow!("bad tar size field {field:?}: {e}"))
}

struct Cleanup {
    docker: PathBuf,
    container: String,
    image: String,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        // Also runs when the future is cancelled, so no async here.
        remove_in_background(self.docker.clone(), self.container.clone(), self.image.clone());
    }
}

/// Remove a container, then its image, off the async workers. Both
/// processes are waited on.
fn remove_in_background(docker: PathBuf, container: String, image: String) -> Option<std::thread::JoinHandle<()>> {
    let spawned = std::thread::Builder::new()
        .name("srcgraph-docker-cleanup".to_string())
        .spawn(move || {
            let docker_cmd = |args: &[&str]| {
                std::process::Command::new(&docker)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
            };
            // The image can only go once the container is gone.
            let removed = docker_cmd(&["rm", "-f", &container]).and_then(|_| docker_cmd(&["rmi", "-f", &image]));
            if let Err(e) = removed {
                tracing::warn!("Failed to clean up docker sandbox {}: {}", container, e);
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Failed to start docker cleanup thread: {}", e);
            None
        }
    }
}
