//! Container runtime boundary.
//!
//! Agents run as long-lived, detached containers that publish an HTTP port on
//! the host. This crate hides the runtime behind [`ContainerBackend`] so the
//! orchestrator can be driven by docker in production and by stubs in tests.

mod backend;
mod config;
mod docker;
mod error;

pub use backend::{BuildOptions, ContainerBackend, NoOpBackend};
pub use config::{ContainerConfig, ContainerId, ExecResult, PortMapping};
pub use docker::{DockerBackend, build_args, run_args};
pub use error::{ContainerError, ContainerResult};

use std::sync::Arc;

/// Pick the first available container runtime.
///
/// Falls back to [`NoOpBackend`] so callers get a descriptive error on first
/// use instead of a panic at startup.
pub async fn detect_backend() -> Arc<dyn ContainerBackend> {
    let docker = DockerBackend::new();
    if docker.is_available().await {
        tracing::debug!(target: "sandbox", backend = docker.name(), "Detected container runtime");
        return Arc::new(docker);
    }

    tracing::warn!(target: "sandbox", "No container runtime detected");
    Arc::new(NoOpBackend)
}
