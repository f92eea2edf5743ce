//! Container backend trait

use crate::{ContainerConfig, ContainerError, ContainerId, ContainerResult, ExecResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Build options for container images
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Path to Dockerfile/Containerfile
    pub file: Option<PathBuf>,
    /// `--build-arg` values, in order
    pub build_args: Vec<(String, String)>,
}

impl BuildOptions {
    /// Create new build options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Dockerfile path
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Add a build argument
    pub fn build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.push((key.into(), value.into()));
        self
    }
}

/// Container backend trait for different container runtimes
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Human-readable name for this backend
    fn name(&self) -> &'static str;

    /// Check if this backend is available on the current system
    async fn is_available(&self) -> bool;

    /// Build an image from a Dockerfile/Containerfile
    ///
    /// # Arguments
    /// * `context_dir` - Build context directory
    /// * `tag` - Tag for the built image
    /// * `options` - Optional build options
    async fn build(
        &self,
        context_dir: &Path,
        tag: &str,
        options: Option<BuildOptions>,
    ) -> ContainerResult<()>;

    /// Start a detached container and return its id
    async fn run_detached(&self, config: &ContainerConfig) -> ContainerResult<ContainerId>;

    /// Execute a command inside a running container.
    ///
    /// A non-zero exit status is reported through `ExecResult::exit_code`,
    /// not as an error.
    async fn exec(&self, container: &str, command: &[String]) -> ContainerResult<ExecResult>;

    /// Force-remove a container by name or id
    async fn remove(&self, container: &str) -> ContainerResult<()>;
}

/// A no-op backend that always fails (used when no container runtime is available)
pub struct NoOpBackend;

#[async_trait]
impl ContainerBackend for NoOpBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn build(
        &self,
        _context_dir: &Path,
        _tag: &str,
        _options: Option<BuildOptions>,
    ) -> ContainerResult<()> {
        Err(ContainerError::not_available(
            "No container runtime available",
        ))
    }

    async fn run_detached(&self, _config: &ContainerConfig) -> ContainerResult<ContainerId> {
        Err(ContainerError::not_available(
            "No container runtime available",
        ))
    }

    async fn exec(&self, _container: &str, _command: &[String]) -> ContainerResult<ExecResult> {
        Err(ContainerError::not_available(
            "No container runtime available",
        ))
    }

    async fn remove(&self, _container: &str) -> ContainerResult<()> {
        Err(ContainerError::not_available(
            "No container runtime available",
        ))
    }
}
