//! Error types for container operations

use thiserror::Error;

/// Result type for container operations
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors returned by a container backend
#[derive(Error, Debug)]
pub enum ContainerError {
    /// No usable container runtime
    #[error("Container runtime not available: {0}")]
    NotAvailable(String),

    /// Image build exited unsuccessfully
    #[error("Image build failed for {tag}:\n{output}")]
    BuildFailed { tag: String, output: String },

    /// Container could not be started
    #[error("Container start failed for {name}: {output}")]
    StartFailed { name: String, output: String },

    /// A runtime command other than build/run exited unsuccessfully
    #[error("Command `{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    /// IO error while spawning the runtime
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Create a runtime-not-available error
    pub fn not_available(msg: impl Into<String>) -> Self {
        ContainerError::NotAvailable(msg.into())
    }

    /// Create a build failure carrying the build tool's output
    pub fn build_failed(tag: impl Into<String>, output: impl Into<String>) -> Self {
        ContainerError::BuildFailed {
            tag: tag.into(),
            output: output.into(),
        }
    }

    /// Create a start failure
    pub fn start_failed(name: impl Into<String>, output: impl Into<String>) -> Self {
        ContainerError::StartFailed {
            name: name.into(),
            output: output.into(),
        }
    }

    /// Create a generic command failure
    pub fn command_failed(command: impl Into<String>, output: impl Into<String>) -> Self {
        ContainerError::CommandFailed {
            command: command.into(),
            output: output.into(),
        }
    }
}
