//! Container runtime access using Docker/Podman
//!
//! The Image Builder runs inside a container. [`ContainerEngine`] is the
//! narrow interface the build code depends on (image lookup, image build,
//! container run); [`CliEngine`] implements it by driving the `podman` or
//! `docker` command line.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Container runtime errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContainerError {
    /// Container runtime not found
    #[error("{program} not found in PATH. Install it or set container_engine in the config file")]
    RuntimeNotFound { program: String },

    /// Container execution failed
    #[error("Container execution failed: {message}")]
    ExecutionFailed { message: String },

    /// Process did not finish in time
    #[error("Container did not finish within {}s", after.as_secs())]
    TimedOut { after: Duration },
}

/// Container runtime type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    /// Podman container runtime
    #[default]
    Podman,
    /// Docker container runtime
    Docker,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }

    /// Parse a runtime name as written in the config file
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "podman" => Some(ContainerRuntime::Podman),
            "docker" => Some(ContainerRuntime::Docker),
            _ => None,
        }
    }

    /// Check if the runtime binary is on `PATH`
    pub fn is_available(&self) -> bool {
        which::which(self.command()).is_ok()
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command())
    }
}

/// Mount configuration for container volumes
#[derive(Debug, Clone, PartialEq)]
pub struct MountConfig {
    /// Host path to mount
    pub host_path: PathBuf,
    /// Container path to mount to
    pub container_path: PathBuf,
    /// Whether the mount is read-only
    pub read_only: bool,
}

impl MountConfig {
    /// Create a new read-only mount
    pub fn read_only(host_path: PathBuf, container_path: PathBuf) -> Self {
        Self {
            host_path,
            container_path,
            read_only: true,
        }
    }

    /// Create a new read-write mount
    pub fn read_write(host_path: PathBuf, container_path: PathBuf) -> Self {
        Self {
            host_path,
            container_path,
            read_only: false,
        }
    }

    /// Volume argument; mounts are relabelled for SELinux hosts
    pub fn to_arg(&self) -> String {
        let options = if self.read_only { "ro,Z" } else { "Z" };
        format!(
            "-v={}:{}:{options}",
            self.host_path.display(),
            self.container_path.display()
        )
    }
}

/// Configuration for running one container
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Container image to use
    pub image: String,
    /// Container name, used to stop it on timeout
    pub name: Option<String>,
    /// Mount configurations
    pub mounts: Vec<MountConfig>,
}

impl RunConfig {
    /// Create a run config for an image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Set the container name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a mount configuration
    #[must_use]
    pub fn with_mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }
}

/// Captured result of a container process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl RunOutput {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output followed by standard error
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Operations the build needs from a container runtime
pub trait ContainerEngine: Send + Sync {
    /// Whether an image with this tag exists locally
    fn image_exists(&self, tag: &str)
        -> impl Future<Output = Result<bool, ContainerError>> + Send;

    /// Build an image from `<context_dir>/Containerfile`
    fn build_image(
        &self,
        context_dir: &Path,
        tag: &str,
    ) -> impl Future<Output = Result<RunOutput, ContainerError>> + Send;

    /// Run a command in a fresh container that is removed afterwards
    fn run(
        &self,
        config: &RunConfig,
        command: &[String],
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<RunOutput, ContainerError>> + Send;
}

/// [`ContainerEngine`] backed by the `podman`/`docker` command line
#[derive(Debug, Clone)]
pub struct CliEngine {
    runtime: ContainerRuntime,
    /// Remote service URI (podman only)
    remote_url: Option<String>,
}

impl CliEngine {
    /// Create an engine for a runtime without checking that it is installed
    pub fn new(runtime: ContainerRuntime) -> Self {
        Self {
            runtime,
            remote_url: None,
        }
    }

    /// Create an engine, failing if the runtime binary is not on `PATH`
    pub fn detect(runtime: ContainerRuntime) -> Result<Self, ContainerError> {
        if !runtime.is_available() {
            return Err(ContainerError::RuntimeNotFound {
                program: runtime.command().to_string(),
            });
        }
        Ok(Self::new(runtime))
    }

    /// Talk to a remote Podman service instead of the local one
    #[must_use]
    pub fn with_remote_url(mut self, url: Option<String>) -> Self {
        self.remote_url = url;
        self
    }

    /// Get the runtime
    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Arguments placed before every subcommand
    pub fn global_args(&self) -> Vec<String> {
        match (&self.runtime, &self.remote_url) {
            (ContainerRuntime::Podman, Some(url)) => vec!["--url".to_string(), url.clone()],
            _ => Vec::new(),
        }
    }

    /// Build the container run command arguments
    pub fn build_run_args(&self, config: &RunConfig, command: &[String]) -> Vec<String> {
        let mut args = self.global_args();
        args.push("run".to_string());
        args.push("--rm".to_string());

        if let Some(name) = &config.name {
            args.push(format!("--name={name}"));
        }

        for mount in &config.mounts {
            args.push(mount.to_arg());
        }

        args.push(config.image.clone());
        args.extend(command.iter().cloned());
        args
    }

    /// Build the image build command arguments
    pub fn build_image_args(&self, context_dir: &Path, tag: &str) -> Vec<String> {
        let mut args = self.global_args();
        args.extend([
            "build".to_string(),
            "-t".to_string(),
            tag.to_string(),
            "-f".to_string(),
            context_dir.join("Containerfile").display().to_string(),
            context_dir.display().to_string(),
        ]);
        args
    }

    async fn execute(
        &self,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<RunOutput, ContainerError> {
        tracing::debug!("Running: {} {}", self.runtime, args.join(" "));

        let output = tokio::process::Command::new(self.runtime.command())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout {
            Some(after) => tokio::time::timeout(after, output)
                .await
                .map_err(|_| ContainerError::TimedOut { after })?,
            None => output.await,
        }
        .map_err(|e| ContainerError::ExecutionFailed {
            message: format!("failed to run {}: {e}", self.runtime),
        })?;

        Ok(RunOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Force-remove a container left behind by a killed client
    async fn remove_container(&self, name: &str) {
        let mut args = self.global_args();
        args.extend(["rm".to_string(), "-f".to_string(), name.to_string()]);
        match self.execute(&args, None).await {
            Ok(output) if output.success() => tracing::info!("Removed container {name}"),
            Ok(output) => tracing::warn!("Failed to remove container {name}: {}", output.stderr),
            Err(e) => tracing::warn!("Failed to remove container {name}: {e}"),
        }
    }
}

impl ContainerEngine for CliEngine {
    async fn image_exists(&self, tag: &str) -> Result<bool, ContainerError> {
        let mut args = self.global_args();
        args.extend([
            "image".to_string(),
            "inspect".to_string(),
            "--format={{.Id}}".to_string(),
            tag.to_string(),
        ]);
        let output = self.execute(&args, None).await?;
        Ok(output.success())
    }

    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<RunOutput, ContainerError> {
        let args = self.build_image_args(context_dir, tag);
        self.execute(&args, None).await
    }

    async fn run(
        &self,
        config: &RunConfig,
        command: &[String],
        timeout: Option<Duration>,
    ) -> Result<RunOutput, ContainerError> {
        let args = self.build_run_args(config, command);
        let result = self.execute(&args, timeout).await;

        if let (Err(ContainerError::TimedOut { .. }), Some(name)) = (&result, &config.name) {
            self.remove_container(name).await;
        }

        result
    }
}
