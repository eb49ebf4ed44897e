//! Session workspace containers
//!
//! Each session owns one long-running Docker container with the session
//! workspace bind-mounted read/write at a fixed path. Commands run through
//! `bash -c` with the mount path as CWD so users can chain with pipes and
//! redirection.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SandboxConfig;
use crate::error::{Error, Result};

/// Exit code reported when a command exceeds its timeout
const TIMEOUT_EXIT_CODE: i64 = 124;

struct Inner {
    docker: Option<Docker>,
    started: bool,
}

/// Per-session isolated command environment.
pub struct WorkspaceContainer {
    session_id: String,
    config: SandboxConfig,
    workspace_dir: PathBuf,
    container_name: String,
    inner: Mutex<Inner>,
}

impl WorkspaceContainer {
    /// Create a handle. Nothing touches Docker until [`start`](Self::start).
    pub fn new(session_id: &str, workspace_dir: PathBuf, config: SandboxConfig) -> Self {
        WorkspaceContainer {
            session_id: session_id.to_string(),
            container_name: format!("agent-workspace-{}", session_id),
            config,
            workspace_dir,
            inner: Mutex::new(Inner {
                docker: None,
                started: false,
            }),
        }
    }

    /// The host workspace directory
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// The in-container mount path
    pub fn mount_path(&self) -> &str {
        &self.config.mount_path
    }

    /// Start the container. Idempotent: ensures the workspace exists, the
    /// image is available (pulling if absent), removes any stale container
    /// with the session name, and launches a long-running container.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.started {
            return Ok(());
        }

        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Sandbox(format!("Failed to connect to Docker: {}", e)))?;
        docker
            .ping()
            .await
            .map_err(|e| Error::Sandbox(format!("Docker not reachable: {}", e)))?;

        std::fs::create_dir_all(&self.workspace_dir)?;

        self.ensure_image(&docker).await?;

        // Remove any stale container left over from a previous run.
        let remove_options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match docker
            .remove_container(&self.container_name, Some(remove_options))
            .await
        {
            Ok(()) => debug!("Removed stale container {}", self.container_name),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => warn!("Could not remove stale container: {}", e),
        }

        let host_path = self
            .workspace_dir
            .canonicalize()
            .unwrap_or_else(|_| self.workspace_dir.clone());
        let bind = format!("{}:{}:rw", host_path.display(), self.config.mount_path);

        let container_config = Config {
            image: Some(self.config.image.clone()),
            cmd: Some(vec![
                "tail".to_string(),
                "-f".to_string(),
                "/dev/null".to_string(),
            ]),
            working_dir: Some(self.config.mount_path.clone()),
            tty: Some(true),
            host_config: Some(bollard::service::HostConfig {
                binds: Some(vec![bind]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: self.container_name.as_str(),
            platform: None,
        };
        docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| Error::Container(format!("Failed to create container: {}", e)))?;

        docker
            .start_container(&self.container_name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Container(format!("Failed to start container: {}", e)))?;

        info!(
            "Started workspace container {} (image {})",
            self.container_name, self.config.image
        );

        inner.docker = Some(docker);
        inner.started = true;
        Ok(())
    }

    async fn ensure_image(&self, docker: &Docker) -> Result<()> {
        let images = docker
            .list_images::<String>(None)
            .await
            .map_err(|e| Error::Container(format!("Failed to list images: {}", e)))?;

        let image_exists = images
            .iter()
            .any(|img| img.repo_tags.iter().any(|tag| tag.contains(&self.config.image)));
        if image_exists {
            return Ok(());
        }

        info!("Pulling image: {}", self.config.image);
        let options = CreateImageOptions {
            from_image: self.config.image.clone(),
            ..Default::default()
        };
        let mut stream = docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(Error::Container(format!("Failed to pull image: {}", e)));
                }
            }
        }
        info!("Image pulled successfully");
        Ok(())
    }

    /// Execute a shell command inside the container.
    ///
    /// Returns `(stdout, stderr, exit_code)`. On timeout the exit code is
    /// non-zero and stderr carries a timeout note.
    pub async fn execute(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<(String, String, i64)> {
        let docker = {
            let inner = self.inner.lock().await;
            inner
                .docker
                .clone()
                .filter(|_| inner.started)
                .ok_or_else(|| {
                    Error::Sandbox("Container not started. Call start() first.".to_string())
                })?
        };

        let exec = docker
            .create_exec(
                &self.container_name,
                CreateExecOptions {
                    cmd: Some(vec![
                        "bash".to_string(),
                        "-c".to_string(),
                        command.to_string(),
                    ]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(self.config.mount_path.clone()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Container(format!("Failed to create exec: {}", e)))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        let collect = async {
            match docker.start_exec(&exec.id, None).await {
                Ok(StartExecResults::Attached { mut output, .. }) => {
                    while let Some(chunk) = output.next().await {
                        match chunk {
                            Ok(bollard::container::LogOutput::StdOut { message }) => {
                                stdout.push_str(&String::from_utf8_lossy(&message));
                            }
                            Ok(bollard::container::LogOutput::StdErr { message }) => {
                                stderr.push_str(&String::from_utf8_lossy(&message));
                            }
                            Ok(bollard::container::LogOutput::Console { message }) => {
                                stdout.push_str(&String::from_utf8_lossy(&message));
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Error reading exec output: {}", e);
                                break;
                            }
                        }
                    }
                    Ok(())
                }
                Ok(StartExecResults::Detached) => Ok(()),
                Err(e) => Err(Error::Container(format!("Failed to start exec: {}", e))),
            }
        };

        match tokio::time::timeout(timeout, collect).await {
            Ok(Ok(())) => {
                let inspect = docker
                    .inspect_exec(&exec.id)
                    .await
                    .map_err(|e| Error::Container(format!("Failed to inspect exec: {}", e)))?;
                let exit_code = inspect.exit_code.unwrap_or(-1);
                Ok((stdout, stderr, exit_code))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    "Command timed out after {}s in {}",
                    timeout.as_secs(),
                    self.container_name
                );
                let note = format!("Command timed out after {} seconds", timeout.as_secs());
                let stderr = if stderr.is_empty() {
                    note
                } else {
                    format!("{}\n{}", stderr, note)
                };
                Ok((stdout, stderr, TIMEOUT_EXIT_CODE))
            }
        }
    }

    /// Resolve a user-supplied path to an absolute host path inside the
    /// workspace. Absolute paths outside the workspace and `..` traversal
    /// are rejected.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace_dir.join(candidate)
        };

        // Normalize without touching the filesystem so missing files can
        // still be resolved for creation.
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(Error::InvalidInput(format!(
                            "Path {} is outside workspace",
                            path
                        )));
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }

        if !normalized.starts_with(&self.workspace_dir) {
            return Err(Error::InvalidInput(format!(
                "Path {} is outside workspace",
                path
            )));
        }
        Ok(normalized)
    }

    /// Convert a host workspace path to its in-container path.
    pub fn container_path(&self, local_path: &Path) -> Result<String> {
        let relative = local_path
            .strip_prefix(&self.workspace_dir)
            .map_err(|_| {
                Error::InvalidInput(format!(
                    "Path {} is not in workspace",
                    local_path.display()
                ))
            })?;
        Ok(Path::new(&self.config.mount_path)
            .join(relative)
            .to_string_lossy()
            .to_string())
    }

    /// Stop and remove the container. Safe from any state.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(docker) = inner.docker.take() {
            let stop_options = StopContainerOptions { t: 5 };
            if let Err(e) = docker
                .stop_container(&self.container_name, Some(stop_options))
                .await
            {
                debug!("Stop container {}: {}", self.container_name, e);
            }
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = docker
                .remove_container(&self.container_name, Some(remove_options))
                .await
            {
                debug!("Remove container {}: {}", self.container_name, e);
            }
        }
        inner.started = false;
    }

    /// Stop the container and, when auto-cleanup is configured, remove the
    /// workspace directory too.
    pub async fn cleanup(&self) {
        self.stop().await;
        if self.config.auto_cleanup && self.workspace_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.workspace_dir) {
                warn!(
                    "Failed to remove workspace {}: {}",
                    self.workspace_dir.display(),
                    e
                );
            }
        }
    }

    /// Whether the container has been started
    pub async fn is_started(&self) -> bool {
        self.inner.lock().await.started
    }

    /// Session this container belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
